//! Upstream authorization. Delivery never checks group membership itself; the
//! HTTP layer asks an `AccessPolicy` before it streams anything.

use std::collections::BTreeSet;

use axum::http::HeaderMap;

use crate::config::{parse_bool, Settings};
use crate::groups::DynamicGroup;
use crate::identity::RequestContext;

/// What a policy may look at when deciding one request.
pub struct AccessRequest<'a> {
    pub context: &'a RequestContext,
    pub headers: &'a HeaderMap,
    pub object_type: &'a str,
    /// Requested path relative to the upload directory.
    pub file: &'a str,
    /// Virtual groups the caller belongs to.
    pub groups: &'a [DynamicGroup],
}

pub trait AccessPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool;
}

/// Trusts a boolean header set by a fronting proxy that already ran the
/// membership check. Missing or unparsable values deny.
#[derive(Debug, Clone)]
pub struct UpstreamHeaderPolicy {
    header: String,
}

impl UpstreamHeaderPolicy {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: header.into().to_ascii_lowercase() }
    }

    pub fn header(&self) -> &str { &self.header }
}

impl AccessPolicy for UpstreamHeaderPolicy {
    fn name(&self) -> &'static str { "upstream_header" }

    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        request
            .headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_bool(v).ok())
            .unwrap_or(false)
    }
}

/// Allows callers holding at least one of the listed group ids.
#[derive(Debug, Clone, Default)]
pub struct GroupAllowListPolicy {
    allowed: BTreeSet<String>,
}

impl GroupAllowListPolicy {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { allowed: ids.into_iter().map(Into::into).collect() }
    }
}

impl AccessPolicy for GroupAllowListPolicy {
    fn name(&self) -> &'static str { "group_allow_list" }

    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        request.groups.iter().any(|g| self.allowed.contains(g.id()))
    }
}

/// Group allow list when `allowed_groups` is configured, proxy header otherwise.
pub fn policy_for(settings: &Settings) -> Box<dyn AccessPolicy> {
    if settings.allowed_groups.is_empty() {
        Box::new(UpstreamHeaderPolicy::new(settings.access_header.clone()))
    } else {
        Box::new(GroupAllowListPolicy::new(settings.allowed_groups.iter().cloned()))
    }
}
