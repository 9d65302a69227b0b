use serde_json::Value;
use std::fmt;

/// JSON 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// 点号分隔的段；作用于数组时若能解析为整数则按下标处理
    Field(String),
    /// 方括号下标 `[0]`
    Index(usize),
}

/// 点号/方括号路径，例如 `data.items[0].id`、`orders.0.id`、`$.token`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim();
        let trimmed = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        let mut segments = Vec::new();
        for part in trimmed.split('.').filter(|p| !p.is_empty()) {
            let (head, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !head.is_empty() {
                segments.push(PathSegment::Field(head.to_string()));
            }

            while let Some(inner) = rest.strip_prefix('[') {
                let Some(end) = inner.find(']') else {
                    // 缺少右括号：剩余部分当作字段名
                    segments.push(PathSegment::Field(rest.to_string()));
                    break;
                };
                let token = inner[..end].trim();
                let unquoted = token.trim_matches(|c| c == '"' || c == '\'');
                match token.parse::<usize>() {
                    Ok(index) => segments.push(PathSegment::Index(index)),
                    Err(_) => segments.push(PathSegment::Field(unquoted.to_string())),
                }
                rest = &inner[end + 1..];
            }
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// 沿路径查找；缺失字段或越界下标返回 None
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
                (PathSegment::Field(name), Value::Array(items)) => {
                    items.get(name.parse::<usize>().ok()?)?
                }
                (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
                (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = JsonPath::parse("$.data.items[0][\"name\"]");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("data".to_string()),
                PathSegment::Field("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("name".to_string()),
            ]
        );
        assert_eq!(path.to_string(), "data.items[0].name");
    }

    #[test]
    fn test_lookup_numeric_dot_segment() {
        let body = json!({"orders": [{"id": 42}]});
        let value = JsonPath::parse("orders.0.id").lookup(&body);
        // 保留原生数字类型
        assert_eq!(value, Some(&json!(42)));
    }

    #[test]
    fn test_lookup_bracket_index() {
        let body = json!({"data": {"items": [{"id": "a"}, {"id": "b"}]}});
        assert_eq!(
            JsonPath::parse("data.items[1].id").lookup(&body),
            Some(&json!("b"))
        );
    }

    #[test]
    fn test_lookup_missing() {
        let body = json!({"orders": [{"id": 42}]});
        assert_eq!(JsonPath::parse("orders.5.id").lookup(&body), None);
        assert_eq!(JsonPath::parse("orders.x").lookup(&body), None);
        assert_eq!(JsonPath::parse("missing").lookup(&body), None);
        assert_eq!(JsonPath::parse("orders.0.id.deeper").lookup(&body), None);
    }

    #[test]
    fn test_root_path() {
        let body = json!([1, 2]);
        let path = JsonPath::parse("$");
        assert!(path.is_root());
        assert_eq!(path.lookup(&body), Some(&body));
    }
}
