/// Predictor seam: the classifier is an opaque collaborator
///
/// The loop only consumes a direction plus a confidence score; how the model
/// is trained and loaded is someone else's problem.

use crate::core::{Direction, MarketSnapshot};

#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub direction: Direction,
    pub confidence: f64,
}

/// Maps a market snapshot to a directional opinion. `None` means the model
/// has no opinion this cycle and the loop trades nothing.
pub trait Predictor: Send + Sync {
    fn predict(&self, snapshot: &MarketSnapshot) -> Option<Prediction>;
}

/// Bar-close momentum heuristic. Keeps the binary runnable without any model
/// artifacts: compares the latest close against the mean close of the
/// lookback window and scales confidence with the size of the move.
pub struct MomentumPredictor {
    lookback: usize,
}

impl MomentumPredictor {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(2),
        }
    }
}

impl Predictor for MomentumPredictor {
    fn predict(&self, snapshot: &MarketSnapshot) -> Option<Prediction> {
        if snapshot.bars.len() < self.lookback {
            return None;
        }
        let window = &snapshot.bars[snapshot.bars.len() - self.lookback..];
        let mean: f64 = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
        let last = window.last()?.close;
        if mean <= 0.0 {
            return None;
        }

        let momentum = (last - mean) / mean;
        if momentum.abs() < 1e-6 {
            return None;
        }

        let direction = if momentum > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };
        // 0.1% of drift saturates the score.
        let confidence = (0.5 + momentum.abs() * 500.0).min(0.99);

        Some(Prediction {
            direction,
            confidence,
        })
    }
}

/// Always returns the same opinion. Used by tests and paper smoke runs.
pub struct StaticPredictor {
    prediction: Option<Prediction>,
}

impl StaticPredictor {
    pub fn new(direction: Direction, confidence: f64) -> Self {
        Self {
            prediction: Some(Prediction {
                direction,
                confidence,
            }),
        }
    }

    pub fn no_opinion() -> Self {
        Self { prediction: None }
    }
}

impl Predictor for StaticPredictor {
    fn predict(&self, _snapshot: &MarketSnapshot) -> Option<Prediction> {
        self.prediction
    }
}
