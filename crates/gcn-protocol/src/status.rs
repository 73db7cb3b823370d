use serde::Serialize;

/// Connectivity status a node reports to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Connecting,
    Connected,
    Disconnected,
    Publishing,
}

/// Indicator colour shown next to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFill {
    Green,
    Red,
    Yellow,
}

/// Indicator shape shown next to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusShape {
    Dot,
    Ring,
}

/// Display hint passed to the host's status call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub fill: StatusFill,
    pub shape: StatusShape,
    pub text: &'static str,
}

impl NodeStatus {
    pub const fn display(self) -> StatusDisplay {
        match self {
            NodeStatus::Connecting => StatusDisplay {
                fill: StatusFill::Yellow,
                shape: StatusShape::Dot,
                text: "connecting",
            },
            NodeStatus::Connected => StatusDisplay {
                fill: StatusFill::Green,
                shape: StatusShape::Dot,
                text: "connected",
            },
            NodeStatus::Disconnected => StatusDisplay {
                fill: StatusFill::Red,
                shape: StatusShape::Dot,
                text: "disconnected",
            },
            NodeStatus::Publishing => StatusDisplay {
                fill: StatusFill::Green,
                shape: StatusShape::Ring,
                text: "publishing",
            },
        }
    }
}

impl From<NodeStatus> for StatusDisplay {
    fn from(status: NodeStatus) -> Self {
        status.display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_is_green_ring() {
        let display = NodeStatus::Publishing.display();
        assert_eq!(display.fill, StatusFill::Green);
        assert_eq!(display.shape, StatusShape::Ring);
        assert_eq!(display.text, "publishing");
    }

    #[test]
    fn display_serializes_lowercase() {
        let json = serde_json::to_value(NodeStatus::Connecting.display()).unwrap();
        assert_eq!(json["fill"], "yellow");
        assert_eq!(json["shape"], "dot");
        assert_eq!(json["text"], "connecting");
    }

    #[test]
    fn disconnected_is_red_dot() {
        let display: StatusDisplay = NodeStatus::Disconnected.into();
        assert_eq!(display.fill, StatusFill::Red);
        assert_eq!(display.shape, StatusShape::Dot);
    }
}
