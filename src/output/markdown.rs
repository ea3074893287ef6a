//! Markdown document rendering
//!
//! Every crawled policy becomes one markdown document with YAML front matter,
//! suitable for loading into a retrieval index.

use crate::model::{Policy, PolicyDetail};
use chrono::{DateTime, Utc};

/// Path of the public detail page, relative to the API base URL
const DETAIL_PAGE_PATH: &str = "/securityJsp/nfrr_inner/internet/lawRule/lawRuleDetail.jsp";

/// Public page of a policy on the source site
pub fn source_url(base_url: &str, policy: &Policy) -> String {
    format!(
        "{}{}?id={}&lawRuleType={}",
        base_url.trim_end_matches('/'),
        DETAIL_PAGE_PATH,
        urlencoding::encode(&policy.id),
        policy.category.code()
    )
}

/// Formats a policy detail as a markdown document
///
/// # Arguments
///
/// * `detail` - The policy detail
/// * `content` - Text extracted from the attachments, if any
/// * `source_url` - Public page of the policy
/// * `crawl_time` - When the policy was crawled
///
/// # Returns
///
/// A formatted markdown string
pub fn render_document(
    detail: &PolicyDetail,
    content: Option<&str>,
    source_url: &str,
    crawl_time: DateTime<Utc>,
) -> String {
    let policy = &detail.policy;
    let keywords = detail.keyword_list();
    let tags = policy.tags();
    let mut md = String::new();

    // Front matter
    md.push_str("---\n");
    push_yaml(&mut md, "title", &policy.title);
    push_yaml(&mut md, "policy_id", &policy.id);
    push_yaml(&mut md, "category", policy.category.name());
    md.push_str(&format!("category_code: {}\n", policy.category.code()));
    push_yaml(&mut md, "office", &policy.office);
    push_yaml(&mut md, "pass_date", policy.pass_day());
    push_yaml(&mut md, "effective_date", detail.effective_day());
    push_yaml(&mut md, "file_type", &policy.file_type);
    push_yaml(&mut md, "timeliness", &policy.timeliness);
    push_yaml(&mut md, "formulate_mode", &policy.formulate_mode);
    push_yaml_list(&mut md, "keywords", &keywords);
    push_yaml_list(&mut md, "tags", &tags);
    push_yaml(&mut md, "source_url", source_url);
    push_yaml(&mut md, "crawl_time", &crawl_time.to_rfc3339());
    md.push_str("---\n\n");

    md.push_str(&format!("# {}\n\n", policy.title));

    md.push_str("## Basic Information\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("|-------|-------|\n");
    push_row(&mut md, "Issuing office", &policy.office);
    push_row(&mut md, "Category", policy.category.name());
    push_row(&mut md, "Document type", &policy.file_type);
    push_row(&mut md, "Pass date", policy.pass_day());
    push_row(&mut md, "Effective date", detail.effective_day());
    push_row(&mut md, "Timeliness", &policy.timeliness);
    push_row(&mut md, "Formulation", &policy.formulate_mode);
    md.push('\n');

    if !keywords.is_empty() {
        md.push_str("## Keywords\n\n");
        md.push_str(&keywords.join(", "));
        md.push_str("\n\n");
    }

    md.push_str("## Content\n\n");
    match content.map(str::trim).filter(|c| !c.is_empty()) {
        Some(text) => {
            md.push_str(text);
            md.push('\n');
        }
        None => {
            md.push_str("> No text could be extracted from the attachments of this policy.\n");
            md.push_str(&format!("> See the original at <{}>.\n", source_url));
        }
    }

    md
}

fn push_yaml(md: &mut String, key: &str, value: &str) {
    md.push_str(&format!("{}: {}\n", key, yaml_string(value)));
}

fn push_yaml_list(md: &mut String, key: &str, values: &[String]) {
    let items: Vec<String> = values.iter().map(|v| yaml_string(v)).collect();
    md.push_str(&format!("{}: [{}]\n", key, items.join(", ")));
}

fn push_row(md: &mut String, field: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    md.push_str(&format!("| {} | {} |\n", field, value.replace('|', "\\|")));
}

/// Double-quoted YAML scalar
fn yaml_string(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', " ");
    format!("\"{}\"", escaped)
}
