use smallvec::SmallVec;

use crate::{
    handle::ObjectKey,
    settings::{RuleCategory, RuleFilter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The violation taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Bounds, alignment, format-class mismatch.
    Structural,
    /// Wrong command buffer state, uninitialized reads, inconsistent layouts.
    State,
    /// Unknown or destroyed handles, double destroy, ownership mismatch.
    Lifecycle,
    /// Reuse of in-flight objects without the permission to do so.
    ConcurrencyContract,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ViolationKind::Structural => "StructuralViolation",
            ViolationKind::State => "StateViolation",
            ViolationKind::Lifecycle => "LifecycleViolation",
            ViolationKind::ConcurrencyContract => "ConcurrencyContractViolation",
        })
    }
}

macro_rules! finding_codes {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $code:literal, $kind:ident, $severity:ident;
        )*
    ) => {
        /// Machine-readable finding codes.
        ///
        /// The string form returned by [`FindingCode::as_str`] is stable.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum FindingCode {
            $(
                $(#[$meta])*
                $variant,
            )*
        }

        impl FindingCode {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)*
                }
            }

            pub const fn kind(self) -> ViolationKind {
                match self {
                    $(Self::$variant => ViolationKind::$kind,)*
                }
            }

            /// The fixed severity of the code.
            pub const fn severity(self) -> Severity {
                match self {
                    $(Self::$variant => Severity::$severity,)*
                }
            }
        }
    };
}

finding_codes! {
    // Handles
    UnknownHandle => "unknown-handle", Lifecycle, Error;
    UseAfterFree => "use-after-free", Lifecycle, Error;
    DuplicateHandle => "duplicate-handle", Lifecycle, Error;
    ParentMismatch => "parent-mismatch", Lifecycle, Error;
    ResetNotPermitted => "reset-not-permitted", Lifecycle, Error;
    ImplicitResetNotPermitted => "implicit-reset-not-permitted", Lifecycle, Error;
    /// Begin on an executable or invalid buffer, which implicitly resets it.
    ImplicitReset => "implicit-reset", State, Info;

    // In-flight reuse
    ResetWhilePending => "reset-while-pending", ConcurrencyContract, Error;
    SimultaneousUse => "simultaneous-use", ConcurrencyContract, Error;
    FreeWhilePending => "free-while-pending", ConcurrencyContract, Error;
    DestroyInUse => "destroy-in-use", ConcurrencyContract, Error;

    // Command buffer lifecycle
    AlreadyRecording => "already-recording", State, Error;
    NotRecording => "not-recording", State, Error;
    SubmitNotExecutable => "submit-not-executable", State, Error;
    SecondarySubmitted => "secondary-submitted", State, Error;
    InheritanceMissing => "inheritance-missing", State, Error;

    // Render pass scope
    InsideRenderPass => "inside-render-pass", State, Error;
    OutsideRenderPass => "outside-render-pass", State, Error;
    UnterminatedRenderPass => "unterminated-render-pass", State, Error;
    RenderPassIncompatible => "render-pass-incompatible", State, Error;
    SubpassMismatch => "subpass-mismatch", State, Error;
    SubpassOutOfRange => "subpass-out-of-range", State, Error;
    SubpassIncomplete => "subpass-incomplete", State, Error;
    FramebufferMismatch => "framebuffer-mismatch", State, Error;

    // Secondary execution
    CommandBufferLevel => "command-buffer-level", State, Error;
    SecondaryNotExecutable => "secondary-not-executable", State, Error;
    RenderPassContinue => "render-pass-continue", State, Error;

    // Draw state
    PipelineNotBound => "pipeline-not-bound", State, Error;
    DynamicStateNotSet => "dynamic-state-not-set", State, Error;
    IndexBufferNotBound => "index-buffer-not-bound", State, Error;
    EmptyDraw => "empty-draw", Structural, Warning;

    // Subresource state
    LayoutMismatch => "layout-mismatch", State, Error;
    LayoutInconsistent => "layout-inconsistent", State, Error;
    UninitializedRead => "uninitialized-read", State, Warning;

    // Structure
    ZeroExtent => "zero-extent", Structural, Error;
    ZeroCount => "zero-count", Structural, Error;
    ZeroSize => "zero-size", Structural, Error;
    RegionOutOfBounds => "region-out-of-bounds", Structural, Error;
    MipLevelOutOfRange => "mip-level-out-of-range", Structural, Error;
    LayerRangeOutOfBounds => "layer-range-out-of-bounds", Structural, Error;
    UnresolvedSentinel => "unresolved-sentinel", Structural, Error;
    AspectMaskInvalid => "aspect-mask-invalid", Structural, Error;
    BlockMisaligned => "block-misaligned", Structural, Error;
    OffsetMisaligned => "offset-misaligned", Structural, Error;
    SampleCountMismatch => "sample-count-mismatch", Structural, Error;
    FormatIncompatible => "format-incompatible", Structural, Error;
    FormatClassMismatch => "format-class-mismatch", Structural, Error;
    DimensionalityMismatch => "dimensionality-mismatch", Structural, Error;
    LayoutInvalid => "layout-invalid", Structural, Error;
    UsageFlagMissing => "usage-flag-missing", Structural, Error;
    RegionOverlap => "region-overlap", Structural, Error;
    BufferRangeOutOfBounds => "buffer-range-out-of-bounds", Structural, Error;
    RowLengthTooSmall => "row-length-too-small", Structural, Error;
    FilterUnsupported => "filter-unsupported", Structural, Error;
    BindPointMismatch => "bind-point-mismatch", Structural, Error;
    RenderAreaOutOfBounds => "render-area-out-of-bounds", Structural, Error;
    AttachmentCountMismatch => "attachment-count-mismatch", Structural, Error;
}

impl std::fmt::Display for FindingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported validation outcome for a single intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    code: FindingCode,
    category: RuleCategory,
    message: String,
    objects: SmallVec<[ObjectKey; 4]>,
}

impl Finding {
    pub fn new(
        code: FindingCode,
        category: RuleCategory,
        objects: &[ObjectKey],
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            objects: SmallVec::from_slice(objects),
        }
    }

    #[inline]
    pub fn code(&self) -> FindingCode {
        self.code
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    #[inline]
    pub fn kind(&self) -> ViolationKind {
        self.code.kind()
    }

    #[inline]
    pub fn category(&self) -> RuleCategory {
        self.category
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The objects implicated by the finding.
    #[inline]
    pub fn objects(&self) -> &[ObjectKey] {
        &self.objects
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind(), self.code, self.message)
    }
}

/// Collects the findings of one intercepted call, in order.
///
/// Findings in a disabled category or severity are dropped on push.
pub struct FindingCollector<'a> {
    category: RuleCategory,
    filter: &'a dyn RuleFilter,
    findings: Vec<Finding>,
}

impl<'a> FindingCollector<'a> {
    pub fn new(category: RuleCategory, filter: &'a dyn RuleFilter) -> Self {
        Self {
            category,
            filter,
            findings: Vec::new(),
        }
    }

    #[inline]
    pub fn category(&self) -> RuleCategory {
        self.category
    }

    pub fn push(&mut self, code: FindingCode, objects: &[ObjectKey], message: impl Into<String>) {
        if !self.filter.is_enabled(self.category) || !self.filter.reports(code.severity()) {
            log::trace!("dropping filtered finding {code} ({:?})", self.category);
            return;
        }

        self.findings.push(Finding::new(code, self.category, objects, message));
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn finish(self) -> Vec<Finding> {
        self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handle::Handle, settings::ValidationSettings};

    #[test]
    fn test_code_table() {
        assert_eq!(FindingCode::ZeroExtent.as_str(), "zero-extent");
        assert_eq!(FindingCode::ZeroExtent.kind(), ViolationKind::Structural);
        assert_eq!(FindingCode::UninitializedRead.severity(), Severity::Warning);
        assert_eq!(FindingCode::ParentMismatch.kind(), ViolationKind::Lifecycle);
        assert_eq!(FindingCode::SubpassMismatch.kind(), ViolationKind::State);
    }

    #[test]
    fn test_collector_filters_disabled_categories() {
        let settings = ValidationSettings::default().without(RuleCategory::Transfer);
        let mut collector = FindingCollector::new(RuleCategory::Transfer, &settings);
        collector.push(FindingCode::ZeroExtent, &[], "dropped");
        assert!(collector.is_empty());
    }

    #[test]
    fn test_collector_filters_severity() {
        let settings = ValidationSettings::default();
        let mut collector = FindingCollector::new(RuleCategory::CommandBuffer, &settings);
        collector.push(FindingCode::ImplicitReset, &[], "info is off by default");
        collector.push(FindingCode::NotRecording, &[], "kept");
        let findings = collector.finish();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code(), FindingCode::NotRecording);
    }

    #[test]
    fn test_finding_display() {
        let key = ObjectKey::image(Handle::from_raw(1));
        let code = FindingCode::ZeroExtent;
        let finding = Finding::new(code, RuleCategory::Transfer, &[key], "region 0 is empty");
        assert_eq!(finding.to_string(), "[StructuralViolation] zero-extent: region 0 is empty");
        assert_eq!(finding.objects(), &[key]);
    }
}
