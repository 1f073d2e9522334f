//! Metric attributes derived from call metadata.

use crate::error::{code_name, error_code};
use crate::server::{UnaryResult, UnaryServerInfo};
use opentelemetry::KeyValue;
use tonic::Code;

pub const GRPC_TYPE_KEY: &str = "grpc.type";
pub const GRPC_SERVICE_KEY: &str = "grpc.service";
pub const GRPC_METHOD_KEY: &str = "grpc.method";
pub const GRPC_CODE_KEY: &str = "grpc.code";

/// Placeholder for components that cannot be parsed.
pub const UNKNOWN: &str = "unknown";

/// Service and method parsed from a full method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor<'a> {
    pub service: &'a str,
    pub method: &'a str,
}

/// Split "/service/method" into its parts.
///
/// Never fails: missing or empty components come back as [`UNKNOWN`].
pub fn parse_full_method(full_method: &str) -> MethodDescriptor<'_> {
    let name = full_method.trim_start_matches('/');
    let (service, method) = name.split_once('/').unwrap_or((name, ""));

    MethodDescriptor {
        service: non_empty(service),
        method: non_empty(method),
    }
}

fn non_empty(part: &str) -> &str {
    if part.is_empty() {
        UNKNOWN
    } else {
        part
    }
}

/// Attribute set recorded with every observation of one invocation.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    attributes: Vec<KeyValue>,
}

impl AttributeSet {
    /// Call type, service and method labels for `info`.
    pub fn for_method(info: &UnaryServerInfo) -> Self {
        let descriptor = parse_full_method(info.full_method());
        Self {
            attributes: vec![
                KeyValue::new(GRPC_TYPE_KEY, info.kind().as_str()),
                KeyValue::new(GRPC_SERVICE_KEY, descriptor.service.to_owned()),
                KeyValue::new(GRPC_METHOD_KEY, descriptor.method.to_owned()),
            ],
        }
    }

    /// A copy of this set extended with the outcome code of `result`.
    pub fn with_outcome(&self, result: &UnaryResult) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.push(outcome_attribute(result));
        Self { attributes }
    }

    pub fn as_slice(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }
}

/// `grpc.code` label for an invocation outcome.
pub fn outcome_attribute(result: &UnaryResult) -> KeyValue {
    let code = match result {
        Ok(_) => Code::Ok,
        Err(err) => error_code(err.as_ref()),
    };
    KeyValue::new(GRPC_CODE_KEY, code_name(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::server::Payload;
    use proptest::prelude::*;
    use tonic::Status;

    #[test]
    fn test_parse_well_formed_method() {
        let descriptor = parse_full_method("/helloworld.Greeter/SayHello");
        assert_eq!(descriptor.service, "helloworld.Greeter");
        assert_eq!(descriptor.method, "SayHello");
    }

    #[test]
    fn test_parse_without_separator() {
        let descriptor = parse_full_method("/Greeter");
        assert_eq!(descriptor.service, "Greeter");
        assert_eq!(descriptor.method, UNKNOWN);
    }

    #[test]
    fn test_parse_empty_input() {
        let descriptor = parse_full_method("");
        assert_eq!(descriptor.service, UNKNOWN);
        assert_eq!(descriptor.method, UNKNOWN);
    }

    #[test]
    fn test_parse_missing_leading_slash() {
        let descriptor = parse_full_method("svc/Get");
        assert_eq!(descriptor.service, "svc");
        assert_eq!(descriptor.method, "Get");
    }

    #[test]
    fn test_parse_trailing_slash() {
        let descriptor = parse_full_method("/svc/");
        assert_eq!(descriptor.service, "svc");
        assert_eq!(descriptor.method, UNKNOWN);
    }

    #[test]
    fn test_method_attributes() {
        let attrs = AttributeSet::for_method(&UnaryServerInfo::new("/svc/Get"));
        assert_eq!(attrs.as_slice().len(), 3);
        assert_eq!(attrs.get(GRPC_TYPE_KEY).as_deref(), Some("unary"));
        assert_eq!(attrs.get(GRPC_SERVICE_KEY).as_deref(), Some("svc"));
        assert_eq!(attrs.get(GRPC_METHOD_KEY).as_deref(), Some("Get"));
        assert_eq!(attrs.get(GRPC_CODE_KEY), None);
    }

    #[test]
    fn test_outcome_codes() {
        let attrs = AttributeSet::for_method(&UnaryServerInfo::new("/svc/Get"));

        let ok: UnaryResult = Ok(Box::new(()) as Payload);
        assert_eq!(attrs.with_outcome(&ok).get(GRPC_CODE_KEY).as_deref(), Some("OK"));

        let not_found: UnaryResult = Err(Box::new(Status::not_found("gone")));
        assert_eq!(
            attrs.with_outcome(&not_found).get(GRPC_CODE_KEY).as_deref(),
            Some("NotFound")
        );

        let other: UnaryResult = Err(BoxError::from("io failure"));
        assert_eq!(
            attrs.with_outcome(&other).get(GRPC_CODE_KEY).as_deref(),
            Some("Unknown")
        );

        // the method-only set is left untouched
        assert_eq!(attrs.as_slice().len(), 3);
    }

    proptest! {
        #[test]
        fn prop_parse_never_yields_empty_parts(input in ".*") {
            let descriptor = parse_full_method(&input);
            prop_assert!(!descriptor.service.is_empty());
            prop_assert!(!descriptor.method.is_empty());
        }

        #[test]
        fn prop_parse_round_trips_simple_names(
            service in "[a-zA-Z][a-zA-Z0-9_.]{0,20}",
            method in "[A-Z][a-zA-Z0-9]{0,20}",
        ) {
            let full = format!("/{service}/{method}");
            let descriptor = parse_full_method(&full);
            prop_assert_eq!(descriptor.service, service.as_str());
            prop_assert_eq!(descriptor.method, method.as_str());
        }
    }
}
