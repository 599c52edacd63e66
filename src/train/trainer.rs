/*
 * @Date         : 2026-10-16
 * @Description  : 带注意力信号的训练循环
 *
 * 每个 epoch：
 * 1. 打乱训练集下标，按 batch 取样，注意力信号为标签的 one-hot
 * 2. 求损失与梯度（范围由`TrainScope`决定），Adam 更新（带权重衰减）
 * 3. 计算训练集平均损失与测试集平均损失，追加到 loss.txt
 * 4. 每`save_interval`个 epoch 保存一次 model{epoch}.bin / optimizer{epoch}.bin
 *
 * 无论训练是否出错或被中断（Ctrl-C 置位中断标志，在 batch 之间检查），
 * 最后都会写出 model.bin / optimizer.bin，然后再返回原始错误。
 */

use super::TrainError;
use crate::data::{ImageDataset, one_hot};
use crate::nn::{Adam, AttentionDeconvNet, Optimizer, TrainScope, WeightDecay};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub epochs: usize,
    /// 每隔多少个 epoch 保存一次检查点
    pub save_interval: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub scope: TrainScope,
    /// 打乱顺序的随机种子；为空时使用系统熵
    pub seed: Option<u64>,
    pub out_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            epochs: 30,
            save_interval: 10,
            learning_rate: 0.001,
            weight_decay: WeightDecay::default().0,
            scope: TrainScope::Attention,
            seed: None,
            out_dir: PathBuf::from("result"),
        }
    }
}

/// 单个 epoch 的统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f32,
    pub test_loss: f32,
}

/// 追加写入的 CSV 损失记录，表头只在文件不存在时写一次
#[derive(Debug, Clone)]
pub struct LossLog {
    path: PathBuf,
}

impl LossLog {
    pub const HEADER: &'static str = "epoch,train_loss,test_loss";

    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, stats: &EpochStats) -> std::io::Result<()> {
        let is_new = !self.path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if is_new {
            writeln!(file, "{}", Self::HEADER)?;
        }
        writeln!(file, "{},{},{}", stats.epoch, stats.train_loss, stats.test_loss)
    }
}

pub struct Trainer {
    config: TrainConfig,
    optimizer: Adam,
    rng: StdRng,
    interrupted: Arc<AtomicBool>,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        let optimizer = Adam::new(config.learning_rate).with_weight_decay(WeightDecay(config.weight_decay));
        Self::with_optimizer(config, optimizer)
    }

    /// 续训时传入之前保存的优化器状态
    pub fn with_optimizer(config: TrainConfig, optimizer: Adam) -> Self {
        let rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            config,
            optimizer,
            rng,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 中断标志：置为 true 后，当前 batch 结束即停止训练（仍会写出最终检查点）
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// 完整训练。出错或被中断时仍写出最终检查点，然后返回原始错误
    pub fn fit<D: ImageDataset + ?Sized>(
        &mut self,
        model: &mut AttentionDeconvNet,
        data: &D,
    ) -> Result<Vec<EpochStats>, TrainError> {
        let out_dir = self.config.out_dir.clone();
        fs::create_dir_all(&out_dir)?;
        fs::write(
            out_dir.join("train_config.json"),
            serde_json::to_string_pretty(&self.config)?,
        )?;

        let result = self.run_epochs(model, data, &out_dir);

        tracing::info!("保存最终检查点到 {}", out_dir.display());
        let saved = self.save_checkpoint(model, &out_dir, None);
        match (result, saved) {
            (Ok(history), Ok(())) => Ok(history),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), saved) => {
                if let Err(save_err) = saved {
                    tracing::error!("保存最终检查点失败: {save_err}");
                }
                Err(e)
            }
        }
    }

    fn run_epochs<D: ImageDataset + ?Sized>(
        &mut self,
        model: &mut AttentionDeconvNet,
        data: &D,
        out_dir: &Path,
    ) -> Result<Vec<EpochStats>, TrainError> {
        let log = LossLog::new(out_dir.join("loss.txt"));
        let mut history = Vec::with_capacity(self.config.epochs);
        for epoch in 1..=self.config.epochs {
            tracing::info!("epoch {epoch}");
            let train_loss = self.train_epoch(model, data)?;
            let test_loss = self.evaluate(model, data)?;
            let stats = EpochStats {
                epoch,
                train_loss,
                test_loss,
            };

            if train_loss.is_finite() && test_loss.is_finite() {
                tracing::info!("train mean loss: {train_loss}, test mean loss: {test_loss}");
            } else {
                tracing::warn!("损失出现非有限值：train = {train_loss}, test = {test_loss}");
            }
            log.append(&stats)?;

            if self.config.save_interval > 0 && epoch % self.config.save_interval == 0 {
                tracing::info!("保存第{epoch}个 epoch 的检查点");
                self.save_checkpoint(model, out_dir, Some(epoch))?;
            }
            history.push(stats);
        }
        Ok(history)
    }

    /// 训练一个 epoch，返回训练集平均损失
    pub fn train_epoch<D: ImageDataset + ?Sized>(
        &mut self,
        model: &mut AttentionDeconvNet,
        data: &D,
    ) -> Result<f32, TrainError> {
        let n = data.count();
        if n == 0 {
            return Err(TrainError::EmptyDataset("训练集"));
        }
        let mut perm: Vec<usize> = (0..n).collect();
        perm.shuffle(&mut self.rng);

        let aux_dim = model.config().aux_dim;
        let mut sum_loss = 0.0f32;
        for batch in perm.chunks(self.config.batch_size.max(1)) {
            if self.interrupted.load(Ordering::SeqCst) {
                tracing::warn!("训练被中断");
                return Err(TrainError::Interrupted);
            }
            let (x, labels) = data.get(batch, false)?;
            let aux = one_hot(&labels, aux_dim)?;
            let (output, grads) = model.backward_with_attention(&x, &aux, &labels, self.config.scope)?;
            self.optimizer.step(model, &grads)?;
            sum_loss += output.loss * batch.len() as f32;
        }
        Ok(sum_loss / n as f32)
    }

    /// 测试集平均损失；测试集为空时为 NaN
    pub fn evaluate<D: ImageDataset + ?Sized>(&self, model: &AttentionDeconvNet, data: &D) -> Result<f32, TrainError> {
        let n = data.test_count();
        let aux_dim = model.config().aux_dim;
        let indices: Vec<usize> = (0..n).collect();
        let mut sum_loss = 0.0f32;
        for batch in indices.chunks(self.config.batch_size.max(1)) {
            let (x, labels) = data.get(batch, true)?;
            let aux = one_hot(&labels, aux_dim)?;
            sum_loss += model.loss_with_attention(&x, &aux, &labels)?.loss * batch.len() as f32;
        }
        Ok(sum_loss / n as f32)
    }

    fn save_checkpoint(
        &self,
        model: &AttentionDeconvNet,
        out_dir: &Path,
        epoch: Option<usize>,
    ) -> Result<(), TrainError> {
        let suffix = epoch.map(|e| e.to_string()).unwrap_or_default();
        model.save(out_dir.join(format!("model{suffix}.bin")))?;
        self.optimizer.save(out_dir.join(format!("optimizer{suffix}.bin")))?;
        Ok(())
    }
}
