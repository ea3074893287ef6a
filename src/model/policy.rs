use crate::model::{safe_file_name, text_field, Category};
use serde::Serialize;
use serde_json::{json, Value};

/// One listed policy, mapped from a raw search row
///
/// Immutable once built; the coordinator only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub id: String,
    pub title: String,
    /// Issuing office name
    pub office: String,
    /// Issue date as sent by the server (not normalized)
    pub pass_date: String,
    pub category: Category,
    pub formulate_mode: String,
    pub timeliness: String,
    pub file_type: String,
    pub tag_names: String,
}

impl Policy {
    /// Maps a raw search row
    ///
    /// Missing fields become empty strings. A missing or unknown
    /// `lawRuleType` falls back to the category that was searched.
    pub fn from_row(row: &Value, fallback: Category) -> Self {
        let category = row
            .get("lawRuleType")
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .and_then(|code| u8::try_from(code).ok())
            .and_then(|code| Category::try_from(code).ok())
            .unwrap_or(fallback);

        let office = row
            .get("officeVo")
            .map(|office| text_field(office, "groupName"))
            .unwrap_or_default();

        Self {
            id: text_field(row, "id"),
            title: text_field(row, "title"),
            office,
            pass_date: text_field(row, "passDate"),
            category,
            formulate_mode: text_field(row, "formulateMode"),
            timeliness: text_field(row, "timeliness"),
            file_type: text_field(row, "fileType"),
            tag_names: text_field(row, "tagNames"),
        }
    }

    /// Renders the policy back into the raw row shape
    pub fn to_row(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "officeVo": { "groupName": self.office },
            "passDate": self.pass_date,
            "lawRuleType": self.category.code(),
            "formulateMode": self.formulate_mode,
            "timeliness": self.timeliness,
            "fileType": self.file_type,
            "tagNames": self.tag_names,
        })
    }

    /// Descriptive tags, split on the ideographic or ASCII comma
    pub fn tags(&self) -> Vec<String> {
        split_list(&self.tag_names, &['、', ','])
    }

    /// First ten characters of the pass date (`YYYY-MM-DD` when present)
    pub fn pass_day(&self) -> &str {
        day_prefix(&self.pass_date)
    }
}

/// One downloadable file attached to a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: String,
    /// Display name, usually including the extension
    pub file_name: String,
    /// Server-side path used to build the download URL
    pub file_path: String,
    pub file_ext: String,
    pub file_class: String,
}

impl Attachment {
    pub fn from_row(row: &Value) -> Self {
        Self {
            id: text_field(row, "id"),
            file_name: text_field(row, "fileName"),
            file_path: text_field(row, "filePath"),
            file_ext: text_field(row, "fileExt"),
            file_class: text_field(row, "fileClass"),
        }
    }

    /// Lowercase extension, from `fileExt` or else the file name suffix
    pub fn extension(&self) -> String {
        let ext = if self.file_ext.trim().is_empty() {
            self.file_name.rsplit_once('.').map(|(_, e)| e).unwrap_or("")
        } else {
            self.file_ext.trim()
        };
        ext.trim_start_matches('.').to_lowercase()
    }

    /// Local file name for the downloaded copy, prefixed with the policy id
    pub fn download_name(&self, policy_id: &str) -> String {
        let name = if self.file_name.trim().is_empty() {
            format!("{}.{}", self.id, self.extension())
        } else {
            self.file_name.clone()
        };
        format!("{}_{}", policy_id, safe_file_name(&name, 120))
    }
}

/// A policy together with its detail payload
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDetail {
    pub policy: Policy,
    /// Raw `lawRule` object as returned by the detail call
    pub law_rule: Value,
    pub attachments: Vec<Attachment>,
    pub keywords: String,
    pub effective_date: String,
    pub associate_id: String,
}

impl PolicyDetail {
    /// Builds the detail from a detail response carrying `lawRule` and `list`
    pub fn from_payload(policy: Policy, payload: &Value) -> Self {
        let law_rule = payload
            .get("lawRule")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| json!({}));

        let attachments = payload
            .get("list")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(Attachment::from_row).collect())
            .unwrap_or_default();

        Self {
            keywords: text_field(&law_rule, "keywords"),
            effective_date: text_field(&law_rule, "effectiveDate"),
            associate_id: text_field(&law_rule, "associate"),
            policy,
            law_rule,
            attachments,
        }
    }

    /// Keywords split on commas, blanks dropped
    pub fn keyword_list(&self) -> Vec<String> {
        split_list(&self.keywords, &[',', '，'])
    }

    pub fn effective_day(&self) -> &str {
        day_prefix(&self.effective_date)
    }
}

fn split_list(raw: &str, separators: &[char]) -> Vec<String> {
    raw.split(separators)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn day_prefix(date: &str) -> &str {
    match date.char_indices().nth(10) {
        Some((idx, _)) => &date[..idx],
        None => date,
    }
}
