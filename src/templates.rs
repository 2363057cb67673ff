//! Published templates, keyed by api name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Template, TemplateSummary};

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_by_api_name(&self, api_name: &str) -> Result<Option<Template>>;

    /// Inserts or replaces a template. A record with the same `id` but a
    /// different api name is replaced as well.
    async fn save(&self, template: Template) -> Result<()>;

    async fn list(&self) -> Result<Vec<TemplateSummary>>;
}

/// An element of a template that requests can overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateElement {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub has_text: bool,
    pub has_src: bool,
}

/// Lists the named, non-frame objects of a renderer configuration.
pub fn template_elements(configuration: &Value) -> Vec<TemplateElement> {
    let Some(objects) = configuration.get("objects").and_then(Value::as_array) else {
        return Vec::new();
    };

    objects
        .iter()
        .filter(|obj| !truthy(obj.get("isCanvasFrame")))
        .filter_map(|obj| {
            let name = obj.get("name").and_then(Value::as_str)?;
            if name.is_empty() {
                return None;
            }
            Some(TemplateElement {
                name: name.to_string(),
                kind: obj.get("type").and_then(Value::as_str).map(str::to_owned),
                has_text: truthy(obj.get("text")),
                has_src: truthy(obj.get("src")),
            })
        })
        .collect()
}

/// JavaScript-style truthiness of an optional JSON value.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn upsert(records: &mut BTreeMap<String, Template>, mut template: Template) {
    records.retain(|_, existing| existing.id != template.id);
    template.updated_at = OffsetDateTime::now_utc();
    records.insert(template.api_name.clone(), template);
}

fn summaries(records: &BTreeMap<String, Template>) -> Vec<TemplateSummary> {
    records.values().map(TemplateSummary::from).collect()
}

/// In-process store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    records: RwLock<BTreeMap<String, Template>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let records = templates
            .into_iter()
            .map(|t| (t.api_name.clone(), t))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get_by_api_name(&self, api_name: &str) -> Result<Option<Template>> {
        Ok(self.records.read().await.get(api_name).cloned())
    }

    async fn save(&self, template: Template) -> Result<()> {
        upsert(&mut *self.records.write().await, template);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TemplateSummary>> {
        Ok(summaries(&*self.records.read().await))
    }
}

/// Store backed by a JSON array on disk, rewritten on every save.
#[derive(Debug)]
pub struct FileTemplateStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Template>>,
}

impl FileTemplateStore {
    /// Loads `path`, or starts empty when it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => {
                let templates: Vec<Template> = serde_json::from_str(&raw)?;
                templates
                    .into_iter()
                    .map(|t| (t.api_name.clone(), t))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        info!(path = %path.display(), count = records.len(), "template store opened");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, Template>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let templates: Vec<&Template> = records.values().collect();
        let raw = serde_json::to_vec_pretty(&templates)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), count = templates.len(), "template store written");
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for FileTemplateStore {
    async fn get_by_api_name(&self, api_name: &str) -> Result<Option<Template>> {
        Ok(self.records.read().await.get(api_name).cloned())
    }

    async fn save(&self, template: Template) -> Result<()> {
        // Writer lock held through the rewrite so saves never interleave on disk.
        let mut records = self.records.write().await;
        let mut next = records.clone();
        upsert(&mut next, template);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TemplateSummary>> {
        Ok(summaries(&*self.records.read().await))
    }
}
