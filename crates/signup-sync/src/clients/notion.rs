//! Notion database client
//!
//! Implements [`RecordStore`] over the public REST API:
//!
//! - `POST /v1/databases/{id}/query` for the duplicate check
//! - `POST /v1/pages` to create a record
//! - `PATCH /v1/blocks/{id}/children` to append image blocks

use super::{decode, ContentBlock, RecordFilter, RecordStore};
use crate::config::NotionConfig;
use crate::error::Result;
use crate::mapper::{Property, PropertyValue};
use crate::schema::FieldKind;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

const SERVICE: &str = "Notion";

pub struct NotionClient {
    client: Client,
    config: NotionConfig,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

impl NotionClient {
    pub fn new(config: NotionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("signup-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header("Notion-Version", &self.config.version)
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    #[instrument(skip(self), fields(property = %filter.property))]
    async fn query(&self, filter: &RecordFilter, page_size: u32) -> Result<Vec<String>> {
        let body = json!({
            "filter": filter_json(filter),
            "page_size": page_size,
        });

        let response = self
            .request(
                Method::POST,
                &format!("databases/{}/query", self.config.database_id),
            )
            .json(&body)
            .send()
            .await?;

        let parsed: QueryResponse = decode(SERVICE, response).await?;
        debug!(matches = parsed.results.len(), "Database query complete");
        Ok(parsed.results.into_iter().map(|p| p.id).collect())
    }

    #[instrument(skip(self, properties), fields(count = properties.len()))]
    async fn create_record(&self, properties: &[Property]) -> Result<String> {
        let body = json!({
            "parent": { "database_id": self.config.database_id },
            "properties": properties_json(properties),
        });

        let response = self
            .request(Method::POST, "pages")
            .json(&body)
            .send()
            .await?;

        let page: PageRef = decode(SERVICE, response).await?;
        debug!(page_id = %page.id, "Page created");
        Ok(page.id)
    }

    #[instrument(skip(self, blocks), fields(count = blocks.len()))]
    async fn append_content(&self, record_id: &str, blocks: &[ContentBlock]) -> Result<()> {
        let children: Vec<Value> = blocks.iter().map(block_json).collect();

        let response = self
            .request(Method::PATCH, &format!("blocks/{}/children", record_id))
            .json(&json!({ "children": children }))
            .send()
            .await?;

        let _: Value = decode(SERVICE, response).await?;
        Ok(())
    }
}

/// `properties` object for a page create call
pub fn properties_json(properties: &[Property]) -> Value {
    let map: Map<String, Value> = properties
        .iter()
        .map(|p| (p.name.clone(), property_json(&p.value)))
        .collect();
    Value::Object(map)
}

pub fn property_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Checkbox(b) => json!({ "checkbox": b }),
        PropertyValue::Date(start) => json!({ "date": { "start": start } }),
        PropertyValue::RichText(segments) => json!({ "rich_text": text_items(segments) }),
        PropertyValue::Title(text) => json!({ "title": text_items(std::slice::from_ref(text)) }),
        PropertyValue::Number(n) => json!({ "number": n }),
        PropertyValue::MultiSelect(tags) => json!({
            "multi_select": tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>()
        }),
        PropertyValue::Select(name) => json!({ "select": { "name": name } }),
        PropertyValue::PhoneNumber(phone) => json!({ "phone_number": phone }),
        PropertyValue::Files(files) => json!({
            "files": files
                .iter()
                .map(|f| json!({
                    "type": "external",
                    "name": f.name,
                    "external": { "url": f.url },
                }))
                .collect::<Vec<_>>()
        }),
    }
}

fn text_items(segments: &[String]) -> Vec<Value> {
    segments
        .iter()
        .map(|s| json!({ "type": "text", "text": { "content": s } }))
        .collect()
}

pub fn filter_json(filter: &RecordFilter) -> Value {
    let key = match filter.kind {
        FieldKind::Title => "title",
        FieldKind::PhoneNumber => "phone_number",
        FieldKind::SingleTag => "select",
        _ => "rich_text",
    };
    let mut condition = Map::new();
    condition.insert(key.to_string(), json!({ "equals": filter.equals }));
    condition.insert("property".to_string(), json!(filter.property));
    Value::Object(condition)
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Image { url } => json!({
            "object": "block",
            "type": "image",
            "image": { "type": "external", "external": { "url": url } },
        }),
    }
}
