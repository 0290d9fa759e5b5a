use std::io::Stdout;

use actfw_core::ProgressReporter;
use pbr::{ProgressBar, Units};

pub struct ProgressBarReporter {
    pb: ProgressBar<Stdout>,
}

impl ProgressReporter for ProgressBarReporter {
    fn start(&mut self, total: usize) {
        self.pb.total = total as u64;
    }

    fn advance(&mut self, amount: usize) {
        self.pb.add(amount as u64);
    }

    fn finish(&mut self) {
        self.pb.finish();
        // New line after progress bar
        println!();
    }
}

impl ProgressBarReporter {
    /// Progress counted in bytes.
    pub fn bytes() -> Self {
        let mut pb = ProgressBar::new(0);
        pb.set_units(Units::Bytes);
        Self { pb }
    }

    /// Progress counted in sectors.
    pub fn sectors() -> Self {
        let mut pb = ProgressBar::new(0);
        pb.message("sectors ");
        Self { pb }
    }
}
