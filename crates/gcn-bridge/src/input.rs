//! Parsing of the JSON lines fed to the bridge on stdin.
//!
//! Each line is a flow message object with an optional `node` field naming
//! the input node it is for (`publish` when absent). A line that is valid
//! JSON but not an object is published as the payload itself.

use serde::Deserialize;

use gcn_protocol::FlowMessage;

/// Input node a line is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    #[default]
    Publish,
    Command,
}

#[derive(Deserialize)]
struct InputLine {
    #[serde(default)]
    node: Route,
    #[serde(flatten)]
    message: FlowMessage,
}

/// Parse one input line.
pub fn parse_line(line: &str) -> serde_json::Result<(Route, FlowMessage)> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Ok((Route::Publish, FlowMessage::new(value)));
    }
    let input: InputLine = serde_json::from_value(value)?;
    Ok((input.node, input.message))
}
