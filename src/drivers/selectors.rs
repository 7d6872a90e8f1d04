//! Matching services against affected pod selectors

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use super::{SelectorSet, ServiceCatalog};
use crate::error::Result;

/// Whether the service's pod selector overlaps any selector of the set
pub fn service_matches_selectors(service: &Service, selectors: &SelectorSet) -> bool {
    let Some(svc_selector) = service.spec.as_ref().and_then(|s| s.selector.as_ref()) else {
        return false;
    };
    if svc_selector.is_empty() {
        return false;
    }
    selectors.iter().any(|sel| selector_matches(sel, svc_selector))
}

/// Evaluate a label selector against a label set
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_ok = selector
        .match_labels
        .as_ref()
        .map(|wanted| wanted.iter().all(|(k, v)| labels.get(k) == Some(v)))
        .unwrap_or(true);

    let expressions_ok = selector
        .match_expressions
        .as_ref()
        .map(|exprs| exprs.iter().all(|expr| requirement_matches(expr, labels)))
        .unwrap_or(true);

    labels_ok && expressions_ok
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let value = labels.get(&req.key);
    let values = req.values.as_deref().unwrap_or_default();
    match req.operator.as_str() {
        "In" => value.map(|v| values.contains(v)).unwrap_or(false),
        "NotIn" => value.map(|v| !values.contains(v)).unwrap_or(true),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        other => {
            debug!("Unknown selector operator {}, treating as no match", other);
            false
        }
    }
}

/// Lists services from the Kubernetes API
pub struct KubeServiceCatalog {
    client: Client,
}

impl KubeServiceCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceCatalog for KubeServiceCatalog {
    async fn list_services(&self) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::all(self.client.clone());
        let services = api.list(&ListParams::default()).await?;
        Ok(services.items)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ServiceSpec;

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn service(selector: Option<BTreeMap<String, String>>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                selector,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn match_labels(pairs: &[(&str, &str)]) -> LabelSelector {
        LabelSelector {
            match_labels: Some(labels(pairs)),
            ..Default::default()
        }
    }

    fn expression(key: &str, operator: &str, values: &[&str]) -> LabelSelector {
        LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: key.to_string(),
                operator: operator.to_string(),
                values: Some(values.iter().map(|v| v.to_string()).collect()),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_match_labels_overlap() {
        let set = SelectorSet::from(vec![match_labels(&[("app", "foo")])]);
        assert!(service_matches_selectors(
            &service(Some(labels(&[("app", "foo")]))),
            &set
        ));
        assert!(!service_matches_selectors(
            &service(Some(labels(&[("app", "bar")]))),
            &set
        ));
    }

    #[test]
    fn test_any_selector_in_set_is_enough() {
        let set = SelectorSet::from(vec![
            match_labels(&[("app", "foo")]),
            match_labels(&[("tier", "db")]),
        ]);
        let svc = service(Some(labels(&[("app", "other"), ("tier", "db")])));
        assert!(service_matches_selectors(&svc, &set));
    }

    #[test]
    fn test_services_without_selector_never_match() {
        let set = SelectorSet::from(vec![LabelSelector::default()]);
        assert!(!service_matches_selectors(&service(None), &set));
        assert!(!service_matches_selectors(&service(Some(BTreeMap::new())), &set));
        assert!(!service_matches_selectors(&Service::default(), &set));
    }

    #[test]
    fn test_empty_selector_set_matches_nothing() {
        let svc = service(Some(labels(&[("app", "foo")])));
        assert!(!service_matches_selectors(&svc, &SelectorSet::default()));
    }

    #[test]
    fn test_match_expressions() {
        let svc_labels = labels(&[("app", "foo"), ("env", "prod")]);

        assert!(selector_matches(&expression("app", "In", &["foo", "bar"]), &svc_labels));
        assert!(!selector_matches(&expression("app", "In", &["bar"]), &svc_labels));
        assert!(selector_matches(&expression("env", "NotIn", &["dev"]), &svc_labels));
        assert!(selector_matches(&expression("missing", "NotIn", &["x"]), &svc_labels));
        assert!(selector_matches(&expression("env", "Exists", &[]), &svc_labels));
        assert!(!selector_matches(&expression("env", "DoesNotExist", &[]), &svc_labels));
        assert!(!selector_matches(&expression("env", "Gt", &["1"]), &svc_labels));
    }

    #[test]
    fn test_labels_and_expressions_combine() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "foo")])),
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["prod".to_string()]),
            }]),
        };
        assert!(selector_matches(&selector, &labels(&[("app", "foo"), ("env", "prod")])));
        assert!(!selector_matches(&selector, &labels(&[("app", "foo"), ("env", "dev")])));
    }
}
