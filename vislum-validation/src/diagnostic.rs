use crossbeam_channel::Sender;

use crate::finding::{Finding, Severity};

/// Receives every finding the validator reports.
pub trait DiagnosticSink: Send + Sync {
    fn publish(&self, finding: &Finding);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Finding) + Send + Sync,
{
    fn publish(&self, finding: &Finding) {
        self(finding)
    }
}

/// Publishes findings through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn publish(&self, finding: &Finding) {
        let level = match finding.severity() {
            Severity::Error => log::Level::Error,
            Severity::Warning => log::Level::Warn,
            Severity::Info => log::Level::Info,
        };

        log::log!(target: "vislum_validation", level, "{finding} {:?}", finding.objects());
    }
}

/// Forwards findings to a consumer on another thread.
///
/// Sending never blocks the validating thread; findings are dropped with a
/// debug log once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Finding>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Finding>) -> Self {
        Self { sender }
    }

    /// Creates a sink with an unbounded channel and returns its receiver.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<Finding>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl DiagnosticSink for ChannelSink {
    fn publish(&self, finding: &Finding) {
        if let Err(e) = self.sender.try_send(finding.clone()) {
            log::debug!("diagnostic channel unavailable, dropping {}: {e}", finding.code());
        }
    }
}

/// Publishes the findings of one call and reports whether any was an error.
pub(crate) struct Diagnostics {
    sink: Box<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(sink: Box<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    pub fn publish(&self, findings: &[Finding]) -> bool {
        let mut has_errors = false;
        for finding in findings {
            has_errors |= finding.severity() == Severity::Error;
            self.sink.publish(finding);
        }

        has_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{finding::FindingCode, settings::RuleCategory};

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, receiver) = ChannelSink::unbounded();
        let diagnostics = Diagnostics::new(Box::new(sink));

        let findings = [
            Finding::new(FindingCode::UninitializedRead, RuleCategory::Transfer, &[], "warn"),
            Finding::new(FindingCode::ZeroExtent, RuleCategory::Transfer, &[], "error"),
        ];

        assert!(diagnostics.publish(&findings));
        let received: Vec<_> = receiver.try_iter().map(|f| f.code()).collect();
        assert_eq!(received, [FindingCode::UninitializedRead, FindingCode::ZeroExtent]);
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let diagnostics = Diagnostics::new(Box::new(LogSink));
        let findings = [Finding::new(FindingCode::EmptyDraw, RuleCategory::Draw, &[], "warn")];
        assert!(!diagnostics.publish(&findings));
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (sink, receiver) = ChannelSink::unbounded();
        drop(receiver);
        sink.publish(&Finding::new(FindingCode::ZeroSize, RuleCategory::Transfer, &[], "lost"));
    }
}
