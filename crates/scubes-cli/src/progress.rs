use indicatif::{ProgressBar, ProgressStyle};
use scubes_core::pipeline::{PipelineStage, ProgressReporter};

/// Drives a single terminal progress bar from pipeline stage events.
pub struct BarReporter {
    pb: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.pb.finish_and_clear();
        if stage == PipelineStage::Refining {
            // The prompt owns the terminal while refining.
            self.pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
            return;
        }
        self.pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.pb.reset();
        match total_items {
            Some(n) => {
                self.pb.set_length(n as u64);
                if let Ok(style) = ProgressStyle::default_bar().template("{msg:26} [{bar:40}] {pos}/{len}") {
                    self.pb.set_style(style.progress_chars("=> "));
                }
            }
            None => {
                self.pb.set_length(0);
                if let Ok(style) = ProgressStyle::default_spinner().template("{msg:26} {spinner}") {
                    self.pb.set_style(style);
                }
                self.pb.tick();
            }
        }
        self.pb.set_message(stage.to_string());
    }

    fn advance(&self, items_done: usize) {
        self.pb.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        self.pb.finish_and_clear();
    }
}
