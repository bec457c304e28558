// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace eligibility

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;

/// Whether `namespace` may receive replicas.
///
/// The source namespace never does, and neither does a namespace carrying
/// `exclude_label` (checked for presence; the value is irrelevant). An empty
/// `exclude_label` disables the label check.
pub fn is_eligible(namespace: &Namespace, source_namespace: &str, exclude_label: &str) -> bool {
    if namespace.metadata.name.as_deref() == Some(source_namespace) {
        return false;
    }
    exclude_label.is_empty() || !namespace.labels().contains_key(exclude_label)
}

/// The eligibility policy shared by every sync path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    pub source_namespace: String,
    pub exclude_label: String,
}

impl NamespacePolicy {
    pub fn new(source_namespace: impl Into<String>, exclude_label: impl Into<String>) -> Self {
        Self {
            source_namespace: source_namespace.into(),
            exclude_label: exclude_label.into(),
        }
    }

    pub fn is_eligible(&self, namespace: &Namespace) -> bool {
        is_eligible(namespace, &self.source_namespace, &self.exclude_label)
    }
}
