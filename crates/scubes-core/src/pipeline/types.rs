/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Acquiring,
    Calibrating,
    Detecting,
    Extracting,
    Refining,
    Converting,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquiring => write!(f, "Acquiring stamps"),
            Self::Calibrating => write!(f, "Calibrating stamps"),
            Self::Detecting => write!(f, "Preparing detection image"),
            Self::Extracting => write!(f, "Extracting sources"),
            Self::Refining => write!(f, "Refining mask"),
            Self::Converting => write!(f, "Converting to flux"),
            Self::Writing => write!(f, "Writing cube"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., band count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
