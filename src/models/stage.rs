use serde::{Deserialize, Serialize};

/// Identifier of a pipeline stage as assigned by the backend of record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The two branches that close an opportunity.
///
/// Terminal stages sit outside the ordered sequence and are only entered
/// through an explicit action, never by dragging a card onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalKind {
    Won,
    Lost,
}

impl std::fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalKind::Won => write!(f, "Won"),
            TerminalKind::Lost => write!(f, "Lost"),
        }
    }
}

/// One step of the sales pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    /// Static key used to look up stage requirements in configuration.
    pub key: String,
    pub name: String,
    /// Position in the active sequence. Ignored for terminal stages.
    #[serde(default, alias = "order")]
    pub order_index: u32,
    #[serde(default, alias = "color")]
    pub color_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalKind>,
}

impl Stage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, order_index: u32) -> Self {
        let id = id.into();
        Self {
            key: id.clone(),
            id: StageId::new(id),
            name: name.into(),
            order_index,
            color_hint: None,
            terminal: None,
        }
    }

    pub fn terminal(id: impl Into<String>, name: impl Into<String>, kind: TerminalKind) -> Self {
        let id = id.into();
        Self {
            key: id.clone(),
            id: StageId::new(id),
            name: name.into(),
            order_index: 0,
            color_hint: None,
            terminal: Some(kind),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color_hint = Some(color.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn is_win_stage(&self) -> bool {
        self.terminal == Some(TerminalKind::Won)
    }

    pub fn is_loss_stage(&self) -> bool {
        self.terminal == Some(TerminalKind::Lost)
    }
}
