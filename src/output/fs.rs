//! Filesystem persistence
//!
//! Layout under the output directory:
//! - `json/policy_<id>.json` - structured detail of each policy
//! - `files/<id>_<name>` - downloaded attachments
//! - `markdown/NNNN_<title>.md` - rendered documents, numbered in crawl order
//! - `progress.json` - final progress ledger of the last run

use crate::config::Config;
use crate::model::{safe_file_name, Attachment, Policy, PolicyDetail};
use crate::output::markdown::{render_document, source_url};
use crate::output::traits::{OutputError, OutputResult, Persistence};
use crate::state::Progress;
use chrono::Utc;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Title characters kept in markdown file names
const TITLE_CHARS: usize = 50;

/// Writes crawl output below one directory
#[derive(Debug)]
pub struct FsPersistence {
    root: PathBuf,
    base_url: String,
    save_json: bool,
    save_markdown: bool,
    /// Next markdown number; `None` until the directory was scanned
    next_number: Mutex<Option<u32>>,
}

impl FsPersistence {
    /// Creates a persistence rooted at `root`
    ///
    /// # Arguments
    ///
    /// * `root` - Output directory
    /// * `base_url` - API base URL, used to link documents to their source
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            save_json: true,
            save_markdown: true,
            next_number: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut persistence = Self::new(&config.output.output_dir, &config.api.base_url);
        persistence.save_json = config.output.save_json;
        persistence.save_markdown = config.output.save_markdown;
        persistence
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn markdown_dir(&self) -> PathBuf {
        self.root.join("markdown")
    }

    /// Takes the next markdown number, scanning existing files on first use
    fn take_number(&self) -> OutputResult<u32> {
        let mut next = self
            .next_number
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let number = match *next {
            Some(n) => n,
            None => highest_number(&self.markdown_dir())? + 1,
        };
        *next = Some(number + 1);
        Ok(number)
    }
}

/// Largest `NNNN_` prefix among the files of `dir`, 0 when there is none
fn highest_number(dir: &Path) -> OutputResult<u32> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(OutputError::io(dir, e)),
    };

    let highest = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let (prefix, _) = name.split_once('_')?;
            prefix.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0);

    Ok(highest)
}

fn write_file(path: &Path, contents: &[u8]) -> OutputResult<()> {
    fs::write(path, contents).map_err(|e| OutputError::io(path, e))
}

impl Persistence for FsPersistence {
    fn prepare(&self) -> OutputResult<()> {
        for dir in [self.json_dir(), self.files_dir(), self.markdown_dir()] {
            fs::create_dir_all(&dir).map_err(|e| OutputError::io(&dir, e))?;
        }
        tracing::debug!(root = %self.root.display(), "Output directories ready");
        Ok(())
    }

    fn attachment_path(&self, policy: &Policy, attachment: &Attachment) -> PathBuf {
        self.files_dir().join(attachment.download_name(&policy.id))
    }

    fn save_detail(&self, detail: &PolicyDetail) -> OutputResult<Option<PathBuf>> {
        if !self.save_json {
            return Ok(None);
        }

        let record = json!({
            "policy": detail.policy.to_row(),
            "lawRule": detail.law_rule,
            "attachments": detail.attachments,
            "crawlTime": Utc::now().to_rfc3339(),
        });
        let path = self
            .json_dir()
            .join(format!("policy_{}.json", safe_file_name(&detail.policy.id, 120)));
        write_file(&path, &serde_json::to_vec_pretty(&record)?)?;

        tracing::debug!(policy_id = %detail.policy.id, path = %path.display(), "Saved detail");
        Ok(Some(path))
    }

    fn save_document(
        &self,
        detail: &PolicyDetail,
        content: Option<&str>,
    ) -> OutputResult<Option<PathBuf>> {
        if !self.save_markdown {
            return Ok(None);
        }

        let url = source_url(&self.base_url, &detail.policy);
        let markdown = render_document(detail, content, &url, Utc::now());

        let number = self.take_number()?;
        let name = format!(
            "{:04}_{}.md",
            number,
            safe_file_name(&detail.policy.title, TITLE_CHARS)
        );
        let path = self.markdown_dir().join(name);
        write_file(&path, markdown.as_bytes())?;

        tracing::debug!(policy_id = %detail.policy.id, path = %path.display(), "Saved document");
        Ok(Some(path))
    }

    fn save_progress(&self, progress: &Progress) -> OutputResult<PathBuf> {
        let path = self.root.join("progress.json");
        write_file(&path, &serde_json::to_vec_pretty(progress)?)?;
        Ok(path)
    }
}
