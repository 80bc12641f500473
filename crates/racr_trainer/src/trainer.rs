//! Gradient-boosted regression trainer
//!
//! Squared-error boosting: each round fits a tree to the gradients
//! `prediction - target` (hessian 1) on a seeded row subsample and column
//! subsample, then adds it with the learning rate as shrinkage. With
//! early stopping enabled the last eval set is watched and the ensemble is
//! cut back to the best round.

use racr_core::config::TrainingConfig;
use racr_core::gbdt::{Model, Tree};
use racr_core::LcgRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::errors::TrainerError;
use crate::metrics::rmse;

/// A named dataset scored after every round
#[derive(Clone, Copy, Debug)]
pub struct EvalSet<'a> {
    pub name: &'a str,
    pub data: &'a Dataset,
}

impl<'a> EvalSet<'a> {
    pub fn new(name: &'a str, data: &'a Dataset) -> Self {
        Self { name, data }
    }
}

/// Evaluation scores after one boosting round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundEval {
    pub round: usize,
    /// RMSE per eval set, in the order the sets were given
    pub rmse: Vec<f64>,
}

/// Fitted ensemble plus its learning curve
#[derive(Clone, Debug)]
pub struct FitResult {
    pub model: Model,
    pub eval_names: Vec<String>,
    pub history: Vec<RoundEval>,
    pub best_iteration: Option<usize>,
}

/// Fit/predict contract of the regressor used by the pipeline
pub trait Regressor {
    fn fit(&self, train: &Dataset, eval_sets: &[EvalSet<'_>]) -> Result<FitResult, TrainerError>;
}

pub struct GbdtTrainer {
    config: TrainingConfig,
}

impl GbdtTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.config.max_depth,
            min_child_weight: self.config.min_child_weight,
            reg_lambda: self.config.reg_lambda,
            reg_alpha: self.config.reg_alpha,
        }
    }

    /// `n * fraction` rounded, at least 1
    fn sample_size(n: usize, fraction: f64) -> usize {
        ((n as f64 * fraction).round() as usize).clamp(1, n.max(1))
    }

    fn sample(rng: &mut LcgRng, n: usize, fraction: f64) -> Vec<usize> {
        if fraction >= 1.0 {
            (0..n).collect()
        } else {
            rng.sample_indices(n, Self::sample_size(n, fraction))
        }
    }

    fn check(&self, train: &Dataset, eval_sets: &[EvalSet<'_>]) -> Result<(), TrainerError> {
        if train.is_empty() {
            return Err(TrainerError::Dataset("training set is empty".to_string()));
        }
        for set in eval_sets {
            if set.data.feature_count != train.feature_count {
                return Err(TrainerError::Dataset(format!(
                    "eval set `{}` has {} features, training set has {}",
                    set.name, set.data.feature_count, train.feature_count
                )));
            }
        }
        if !(self.config.learning_rate > 0.0) {
            return Err(TrainerError::Training(format!(
                "learning rate must be positive, got {}",
                self.config.learning_rate
            )));
        }
        Ok(())
    }
}

impl Regressor for GbdtTrainer {
    fn fit(&self, train: &Dataset, eval_sets: &[EvalSet<'_>]) -> Result<FitResult, TrainerError> {
        self.check(train, eval_sets)?;

        let cfg = &self.config;
        let base_score = train.mean_target();
        let hessians = vec![1.0; train.len()];
        let mut rng = LcgRng::new(cfg.seed);

        let mut train_pred = vec![base_score; train.len()];
        let mut eval_pred: Vec<Vec<f64>> = eval_sets
            .iter()
            .map(|s| vec![base_score; s.data.len()])
            .collect();

        let watch_early_stop = cfg.early_stopping_rounds > 0 && !eval_sets.is_empty();
        let mut best: Option<(usize, f64)> = None;
        let mut trees: Vec<Tree> = Vec::with_capacity(cfg.num_boost_round);
        let mut history = Vec::with_capacity(cfg.num_boost_round);

        for round in 0..cfg.num_boost_round {
            let gradients: Vec<f64> = train_pred
                .iter()
                .zip(&train.targets)
                .map(|(p, y)| p - y)
                .collect();

            let rows = Self::sample(&mut rng, train.len(), cfg.subsample);
            let columns = Self::sample(&mut rng, train.feature_count, cfg.colsample_bytree);

            let builder = CartBuilder::new(
                &train.features,
                &gradients,
                &hessians,
                columns,
                self.tree_config(),
            );
            let mut tree = builder.build(&rows);
            tree.weight = cfg.learning_rate;

            for (pred, row) in train_pred.iter_mut().zip(&train.features) {
                *pred += tree.evaluate(row);
            }
            for (preds, set) in eval_pred.iter_mut().zip(eval_sets) {
                for (pred, row) in preds.iter_mut().zip(&set.data.features) {
                    *pred += tree.evaluate(row);
                }
            }
            trees.push(tree);

            let scores: Vec<f64> = eval_pred
                .iter()
                .zip(eval_sets)
                .map(|(p, s)| rmse(p, &s.data.targets))
                .collect();

            if cfg.verbose_eval > 0 && (round % cfg.verbose_eval == 0 || round + 1 == cfg.num_boost_round) {
                let line: Vec<String> = eval_sets
                    .iter()
                    .zip(&scores)
                    .map(|(s, v)| format!("{}-rmse:{:.5}", s.name, v))
                    .collect();
                info!("[{}]\t{}", round, line.join("\t"));
            }

            history.push(RoundEval {
                round,
                rmse: scores,
            });

            if watch_early_stop {
                let watched = history[round].rmse[eval_sets.len() - 1];
                match best {
                    Some((_, score)) if watched >= score => {}
                    _ => best = Some((round, watched)),
                }
                if let Some((best_round, score)) = best {
                    if round - best_round >= cfg.early_stopping_rounds {
                        info!(
                            "Stopping. Best iteration: [{}] {}-rmse:{:.5}",
                            best_round,
                            eval_sets[eval_sets.len() - 1].name,
                            score
                        );
                        break;
                    }
                }
            }
        }

        let best_iteration = best.map(|(r, _)| r);
        let mut model = Model::new(train.feature_count, base_score, trees);
        if let Some(best_round) = best_iteration {
            model.truncate(best_round + 1);
            model.best_iteration = Some(best_round);
        }
        debug!(trees = model.num_trees(), ?best_iteration, "boosting finished");

        Ok(FitResult {
            model,
            eval_names: eval_sets.iter().map(|s| s.name.to_string()).collect(),
            history,
            best_iteration,
        })
    }
}
