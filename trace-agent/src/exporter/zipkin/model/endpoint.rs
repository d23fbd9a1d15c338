use serde::Serialize;

/// Network context of a span, here always the local service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Endpoint {
    service_name: String,
}

impl Endpoint {
    pub(crate) fn new(service_name: String) -> Self {
        Endpoint { service_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_service_name() {
        let endpoint = Endpoint::new("checkout".to_string());
        assert_eq!(
            serde_json::to_string(&endpoint).unwrap(),
            r#"{"serviceName":"checkout"}"#
        );
    }
}
