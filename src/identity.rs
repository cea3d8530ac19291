//! Exporter naming: topic derivation and the checkpoint node path.

const EXPORTER_SUFFIX: &str = "-exporter";

/// Identifies one exporter and the topic it publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterIdentity {
    name: String,
    topic_override: Option<String>,
}

impl ExporterIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic_override: None,
        }
    }

    /// Pins the topic instead of deriving it from the exporter name.
    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic_override = topic.filter(|t| !t.is_empty());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic name: the explicit override, or the exporter name without its
    /// trailing `-exporter` and with the first `-` replaced by `_`.
    pub fn topic_name(&self) -> String {
        if let Some(topic) = &self.topic_override {
            return topic.clone();
        }

        let base = self.name.strip_suffix(EXPORTER_SUFFIX).unwrap_or(&self.name);
        base.replacen('-', "_", 1)
    }

    /// ZooKeeper node holding the checkpoint.
    ///
    /// The `block-number` leaf is kept for compatibility with existing
    /// deployments; the payload is a generic position.
    pub fn position_node(&self) -> String {
        format!("/{}/{}/block-number", self.name, self.topic_name())
    }

    /// `transactional.id` used when the producer runs in transactional mode.
    pub fn transactional_id(&self) -> String {
        self.topic_name()
    }
}
