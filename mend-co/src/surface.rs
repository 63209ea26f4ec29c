//! The data/schema surface fixes are applied against
//!
//! Holds the pipeline's expected record schema, the ordered list of
//! data-shaping rules applied before validation, the pipeline config map,
//! and the last failing payload sample used to verify schema and
//! transformation fixes.

use mend_common::model::{FieldType, SchemaPatch, TransformKind, TransformRule};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// One field in the pipeline record schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// Expected shape of a pipeline record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<SchemaField>,
}

impl RecordSchema {
    /// The employee feed schema the pipeline validates against by default
    pub fn employee_default() -> Self {
        let field = |name: &str, field_type| SchemaField {
            name: name.to_string(),
            field_type,
            required: true,
        };
        Self {
            fields: vec![
                field("id", FieldType::Integer),
                field("name", FieldType::String),
                field("email", FieldType::String),
                field("department", FieldType::String),
                field("salary", FieldType::Number),
                field("hire_date", FieldType::String),
            ],
        }
    }

    /// Validate a record, returning one message per violation
    pub fn validate(&self, record: &Value) -> Vec<String> {
        let object = match record.as_object() {
            Some(object) => object,
            None => return vec!["record is not a JSON object".to_string()],
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(format!("Missing required field '{}'", field.name));
                    }
                }
                Some(value) => {
                    let ok = match field.field_type {
                        FieldType::Integer => value.is_i64() || value.is_u64(),
                        FieldType::Number => value.is_number(),
                        FieldType::String => value.is_string(),
                        FieldType::Boolean => value.is_boolean(),
                    };
                    if !ok {
                        errors.push(format!(
                            "'{}' must be {}",
                            field.name,
                            field.field_type.as_str()
                        ));
                    }
                }
            }
        }
        errors
    }

    /// Apply a schema patch in place
    pub fn apply_patch(&mut self, patch: &SchemaPatch) {
        for name in &patch.make_optional {
            if let Some(field) = self.fields.iter_mut().find(|f| &f.name == name) {
                field.required = false;
            }
        }
        for spec in &patch.add_fields {
            if !self.fields.iter().any(|f| f.name == spec.name) {
                self.fields.push(SchemaField {
                    name: spec.name.clone(),
                    field_type: spec.field_type,
                    required: false,
                });
            }
        }
    }
}

/// Apply one transform rule to a record
fn apply_rule(rule: &TransformRule, record: &mut Map<String, Value>) {
    match &rule.kind {
        TransformKind::DefaultValue { field, value } => {
            let missing = matches!(record.get(field), None | Some(Value::Null));
            if missing {
                record.insert(field.clone(), value.clone());
            }
        }
        TransformKind::RenameField { from, to } => {
            if !record.contains_key(to) {
                if let Some(value) = record.remove(from) {
                    record.insert(to.clone(), value);
                }
            }
        }
        TransformKind::CoerceNumber { field } => {
            if let Some(Value::String(raw)) = record.get(field) {
                if let Ok(parsed) = raw.trim().parse::<f64>() {
                    if let Some(number) = serde_json::Number::from_f64(parsed) {
                        record.insert(field.clone(), Value::Number(number));
                    }
                }
            }
        }
    }
}

/// In-process pipeline surface: schema, transforms, config, failing sample
pub struct PipelineSurface {
    schema: RwLock<RecordSchema>,
    transforms: RwLock<Vec<TransformRule>>,
    config: RwLock<HashMap<String, String>>,
    /// Last failing payload reported at ingestion; verification target
    sample: RwLock<Option<Value>>,
}

impl Default for PipelineSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSurface {
    pub fn new() -> Self {
        Self {
            schema: RwLock::new(RecordSchema::employee_default()),
            transforms: RwLock::new(Vec::new()),
            config: RwLock::new(HashMap::new()),
            sample: RwLock::new(None),
        }
    }

    /// Built-in sample used when no failing payload has been reported yet
    fn builtin_sample() -> Value {
        json!({
            "id": 1,
            "name": "Alice Smith",
            "email": "alice@example.com",
            "department": "Engineering",
            "salary": 120000,
            "hire_date": "2020-01-15"
        })
    }

    pub async fn set_failing_sample(&self, payload: Value) {
        *self.sample.write().await = Some(payload);
    }

    pub async fn schema_snapshot(&self) -> RecordSchema {
        self.schema.read().await.clone()
    }

    pub async fn restore_schema(&self, snapshot: RecordSchema) {
        *self.schema.write().await = snapshot;
    }

    pub async fn apply_schema_patch(&self, patch: &SchemaPatch) {
        let mut schema = self.schema.write().await;
        schema.apply_patch(patch);
        debug!(?patch, "Schema patch applied");
    }

    /// Register a transform rule; replaces any rule with the same name
    pub async fn register_transform(&self, rule: TransformRule) {
        let mut transforms = self.transforms.write().await;
        transforms.retain(|existing| existing.name != rule.name);
        transforms.push(rule);
    }

    pub async fn remove_transform(&self, name: &str) {
        self.transforms.write().await.retain(|rule| rule.name != name);
    }

    pub async fn transform_count(&self) -> usize {
        self.transforms.read().await.len()
    }

    /// Write a config value, returning the prior value
    pub async fn set_config(&self, key: &str, value: &str) -> Option<String> {
        self.config
            .write()
            .await
            .insert(key.to_string(), value.to_string())
    }

    pub async fn config_value(&self, key: &str) -> Option<String> {
        self.config.read().await.get(key).cloned()
    }

    pub async fn remove_config(&self, key: &str) {
        self.config.write().await.remove(key);
    }

    /// Run the registered transforms over a record
    pub async fn apply_transforms(&self, record: Value) -> Value {
        let mut object = match record {
            Value::Object(object) => object,
            other => return other,
        };
        for rule in self.transforms.read().await.iter() {
            apply_rule(rule, &mut object);
        }
        Value::Object(object)
    }

    /// Transform and validate the failing sample against the current schema
    ///
    /// Empty result means the pipeline would accept the record now.
    pub async fn validate_sample(&self) -> Vec<String> {
        let sample = self
            .sample
            .read()
            .await
            .clone()
            .unwrap_or_else(Self::builtin_sample);
        let transformed = self.apply_transforms(sample).await;
        self.schema.read().await.validate(&transformed)
    }
}
