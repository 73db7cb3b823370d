//! Resource name builders and parsers for Pub/Sub and Cloud IoT.
//!
//! Resource structure:
//! ```text
//! projects/{project}/topics/{topic}
//! projects/{project}/subscriptions/{subscription}
//! projects/{project}/locations/{region}/registries/{registry}/devices/{device}
//! ```

const PREFIX: &str = "projects";

// ─── Pub/Sub resources ───

/// Full topic resource name. Names that are already fully qualified pass through.
pub fn topic(project: &str, topic: &str) -> String {
    if topic.starts_with("projects/") {
        return topic.to_string();
    }
    format!("{PREFIX}/{project}/topics/{topic}")
}

/// Full subscription resource name. Names that are already fully qualified pass through.
pub fn subscription(project: &str, subscription: &str) -> String {
    if subscription.starts_with("projects/") {
        return subscription.to_string();
    }
    format!("{PREFIX}/{project}/subscriptions/{subscription}")
}

// ─── Cloud IoT resources ───

pub fn registry(project: &str, region: &str, registry: &str) -> String {
    format!("{PREFIX}/{project}/locations/{region}/registries/{registry}")
}

pub fn device(project: &str, region: &str, registry_id: &str, device: &str) -> String {
    format!("{}/devices/{device}", registry(project, region, registry_id))
}

// ─── Parsing ───

/// Components of a parsed resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResource {
    pub project: String,
    pub collection: String,
    pub name: String,
}

/// Parse a `projects/{p}/{collection}/{name}` resource name.
///
/// Mirrors how delivered messages are labelled: the project is the third
/// segment from the end and the short name is the last one.
pub fn parse(resource: &str) -> Option<ParsedResource> {
    let parts: Vec<&str> = resource.split('/').collect();
    if parts.len() < 4 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let n = parts.len();
    Some(ParsedResource {
        project: parts[n - 3].to_string(),
        collection: parts[n - 2].to_string(),
        name: parts[n - 1].to_string(),
    })
}

/// Short name of a resource (the last path segment).
pub fn short_name(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}
