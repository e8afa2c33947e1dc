//! Action 输入字段：通用的「名称 -> 类型 + 约束」记录
//!
//! 本地 Action 可手写字段或从 schemars 类型推导，远程工具从其 JSON Schema 解析；
//! 选择器与调度器对两者一视同仁。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::{ActionError, ActionResult};

/// 字段的 JSON 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// 不限类型
    Any,
}

impl FieldKind {
    fn from_schema_type(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Any,
        }
    }

    fn schema_type(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Array => Some("array"),
            Self::Object => Some("object"),
            Self::Any => None,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// 单个输入字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// 枚举取值，空表示不限
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
}

impl FieldSpec {
    /// 必填字段
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: true,
            nullable: false,
            default: None,
            choices: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// 设置默认值（隐含非必填）
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.required = false;
        self
    }

    pub fn one_of(mut self, choices: Vec<Value>) -> Self {
        self.choices = choices;
        self
    }

    fn to_property(&self) -> Value {
        let mut prop = Map::new();
        match (self.kind.schema_type(), self.nullable) {
            (Some(ty), true) => {
                prop.insert("type".into(), json!([ty, "null"]));
            }
            (Some(ty), false) => {
                prop.insert("type".into(), json!(ty));
            }
            (None, _) => {}
        }
        if let Some(desc) = &self.description {
            prop.insert("description".into(), json!(desc));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        if !self.choices.is_empty() {
            prop.insert("enum".into(), Value::Array(self.choices.clone()));
        }
        Value::Object(prop)
    }

    fn from_property(name: &str, prop: &Value, required: bool) -> Self {
        let (kind, mut nullable) = match prop.get("type") {
            Some(Value::String(ty)) => (FieldKind::from_schema_type(ty), ty == "null"),
            Some(Value::Array(types)) => {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                let nullable = names.contains(&"null");
                let concrete: Vec<&str> = names.into_iter().filter(|t| *t != "null").collect();
                let kind = match concrete.as_slice() {
                    [single] => FieldKind::from_schema_type(single),
                    _ => FieldKind::Any,
                };
                (kind, nullable)
            }
            _ => (FieldKind::Any, false),
        };
        // anyOf: [{...}, {"type": "null"}]
        let mut kind = kind;
        if let Some(Value::Array(variants)) = prop.get("anyOf") {
            let concrete: Vec<&Value> = variants
                .iter()
                .filter(|v| v.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            nullable |= concrete.len() < variants.len();
            if let [single] = concrete.as_slice() {
                kind = single
                    .get("type")
                    .and_then(Value::as_str)
                    .map(FieldKind::from_schema_type)
                    .unwrap_or(FieldKind::Any);
            }
        }

        Self {
            name: name.to_string(),
            kind,
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            required,
            nullable,
            default: prop.get("default").cloned(),
            choices: prop
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// 有序字段集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    fields: Vec<FieldSpec>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名字段后者覆盖前者
    pub fn push(&mut self, field: FieldSpec) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从 JSON Schema（object + properties + required）解析
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut set = Self::new();
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (name, prop) in props {
                set.push(FieldSpec::from_property(
                    name,
                    prop,
                    required.contains(&name.as_str()),
                ));
            }
        }
        set
    }

    /// 从 schemars 类型推导字段
    pub fn from_type<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        serde_json::to_value(&root)
            .map(|schema| Self::from_json_schema(&schema))
            .unwrap_or_default()
    }

    /// 生成给选择器使用的参数 JSON Schema
    pub fn to_json_schema(&self, title: &str, description: &str) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_property()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "title": title,
            "description": description,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// 校验参数：补默认值、拒绝缺失必填/类型不符/不在枚举内的值，丢弃未声明的键
    pub fn validate(&self, action: &str, args: Value) -> ActionResult<Map<String, Value>> {
        let mut input = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ActionError::validation(
                    action,
                    format!("arguments must be a JSON object, got {other}"),
                ))
            }
        };

        let mut validated = Map::new();
        for field in &self.fields {
            match input.remove(&field.name) {
                None => {
                    if let Some(default) = &field.default {
                        validated.insert(field.name.clone(), default.clone());
                    } else if field.required {
                        return Err(ActionError::validation(
                            action,
                            format!("missing field `{}`", field.name),
                        ));
                    }
                }
                Some(Value::Null) if field.nullable || !field.required => {
                    validated.insert(field.name.clone(), Value::Null);
                }
                Some(value) => {
                    if !field.kind.accepts(&value) {
                        return Err(ActionError::validation(
                            action,
                            format!("field `{}` expects {:?}, got {value}", field.name, field.kind),
                        ));
                    }
                    if !field.choices.is_empty() && !field.choices.contains(&value) {
                        return Err(ActionError::validation(
                            action,
                            format!("field `{}` does not allow {value}", field.name),
                        ));
                    }
                    validated.insert(field.name.clone(), value);
                }
            }
        }

        if !input.is_empty() {
            let ignored: Vec<&String> = input.keys().collect();
            tracing::debug!(action = %action, ignored = ?ignored, "undeclared arguments dropped");
        }
        Ok(validated)
    }
}

impl FromIterator<FieldSpec> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldSpec>>(iter: I) -> Self {
        let mut set = Self::new();
        for field in iter {
            set.push(field);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct TranslateArgs {
        /// Target language
        language: String,
        /// Number of alternatives
        alternatives: Option<i64>,
    }

    fn math_fields() -> FieldSet {
        [FieldSpec::string("answer").describe("Your answer to the math problem")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_validate_accepts_declared() {
        let args = math_fields()
            .validate("MathProblem", json!({"answer": "16", "extra": 1}))
            .unwrap();
        assert_eq!(args.get("answer"), Some(&json!("16")));
        assert!(args.get("extra").is_none());
    }

    #[test]
    fn test_validate_missing_required() {
        let err = math_fields().validate("MathProblem", json!({})).unwrap_err();
        assert!(err.to_string().contains("missing field `answer`"));
    }

    #[test]
    fn test_validate_wrong_type_and_choices() {
        let fields: FieldSet = [
            FieldSpec::new("count", FieldKind::Integer),
            FieldSpec::string("mode").one_of(vec![json!("fast"), json!("slow")]),
        ]
        .into_iter()
        .collect();

        assert!(fields
            .validate("A", json!({"count": "three", "mode": "fast"}))
            .is_err());
        assert!(fields
            .validate("A", json!({"count": 3, "mode": "medium"}))
            .is_err());
        assert!(fields.validate("A", json!({"count": 3, "mode": "slow"})).is_ok());
        assert!(fields.validate("A", json!([1, 2])).is_err());
    }

    #[test]
    fn test_validate_defaults() {
        let fields: FieldSet = [FieldSpec::string("lang").default_value(json!("en"))]
            .into_iter()
            .collect();
        let args = fields.validate("A", Value::Null).unwrap();
        assert_eq!(args["lang"], "en");
    }

    #[test]
    fn test_from_json_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search text"},
                "limit": {"type": ["integer", "null"], "default": 10},
                "scope": {"anyOf": [{"type": "string"}, {"type": "null"}]}
            },
            "required": ["query"]
        });
        let fields = FieldSet::from_json_schema(&schema);
        assert_eq!(fields.len(), 3);

        let query = fields.get("query").unwrap();
        assert!(query.required);
        assert_eq!(query.kind, FieldKind::String);

        let limit = fields.get("limit").unwrap();
        assert_eq!(limit.kind, FieldKind::Integer);
        assert!(limit.nullable);
        assert_eq!(limit.default, Some(json!(10)));

        let scope = fields.get("scope").unwrap();
        assert_eq!(scope.kind, FieldKind::String);
        assert!(scope.nullable);
        assert!(!scope.required);
    }

    #[test]
    fn test_from_type() {
        let fields = FieldSet::from_type::<TranslateArgs>();
        let language = fields.get("language").unwrap();
        assert!(language.required);
        assert_eq!(language.description.as_deref(), Some("Target language"));
        let alternatives = fields.get("alternatives").unwrap();
        assert!(!alternatives.required);
        assert_eq!(alternatives.kind, FieldKind::Integer);
    }

    #[test]
    fn test_to_json_schema() {
        let schema = math_fields().to_json_schema("MathProblem", "Solve math");
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["answer"]));
        assert_eq!(schema["properties"]["answer"]["type"], "string");
    }
}
