use std::fmt::Display;

/// A request descriptor: an API function plus its ordered query parameters.
pub trait RequestParameters: Send + Sync {
    /// Endpoint path relative to the server root, e.g. `api/table.xml`
    fn function(&self) -> &str;

    fn query(&self) -> Vec<(String, String)>;
}

/// A command that targets many objects at once.
///
/// The engine splits the id list into bounded chunks and temporarily installs each chunk via
/// [`set_object_ids`](MultiTargetParameters::set_object_ids); the original list is always put
/// back before the call returns.
pub trait MultiTargetParameters: RequestParameters {
    fn object_ids(&self) -> &[i32];

    fn set_object_ids(&mut self, ids: Vec<i32>);
}

/// Generic descriptor: a function and a list of query pairs in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    function: String,
    pairs: Vec<(String, String)>,
}

impl Parameters {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            pairs: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Display) {
        self.pairs.push((key.into(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl RequestParameters for Parameters {
    fn function(&self) -> &str {
        &self.function
    }

    fn query(&self) -> Vec<(String, String)> {
        self.pairs.clone()
    }
}

/// Descriptor for commands such as pause, resume or delete that accept many object ids.
///
/// Ids are emitted first, as a single comma separated `id` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParameters {
    inner: Parameters,
    object_ids: Vec<i32>,
}

impl CommandParameters {
    pub fn new(function: impl Into<String>, object_ids: Vec<i32>) -> Self {
        Self {
            inner: Parameters::new(function),
            object_ids,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.inner.push(key, value);
        self
    }
}

impl RequestParameters for CommandParameters {
    fn function(&self) -> &str {
        self.inner.function()
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.inner.pairs.len() + 1);
        if !self.object_ids.is_empty() {
            let ids = self
                .object_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            out.push(("id".to_string(), ids));
        }
        out.extend(self.inner.query());
        out
    }
}

impl MultiTargetParameters for CommandParameters {
    fn object_ids(&self) -> &[i32] {
        &self.object_ids
    }

    fn set_object_ids(&mut self, ids: Vec<i32>) {
        self.object_ids = ids;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_keep_insertion_order() {
        let p = Parameters::new("api/table.xml")
            .with("content", "sensors")
            .with("count", 500);
        assert_eq!(p.function(), "api/table.xml");
        assert_eq!(
            p.query(),
            vec![
                ("content".to_string(), "sensors".to_string()),
                ("count".to_string(), "500".to_string())
            ]
        );
        assert_eq!(p.get("count"), Some("500"));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn test_command_parameters_join_ids() {
        let p = CommandParameters::new("api/pause.htm", vec![1001, 1002]).with("action", 0);
        assert_eq!(
            p.query(),
            vec![
                ("id".to_string(), "1001,1002".to_string()),
                ("action".to_string(), "0".to_string())
            ]
        );
    }

    #[test]
    fn test_command_parameters_without_ids() {
        let p = CommandParameters::new("api/pause.htm", Vec::new());
        assert!(p.query().is_empty());
    }
}
