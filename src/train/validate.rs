/*
 * @Date         : 2026-10-16
 * @Description  : 训练后模型的检查与验证
 *
 * 注意力信号一律取为类别的 one-hot（`eye(aux_dim)[t]`）。
 */

use super::TrainError;
use crate::data::{ImageDataset, one_hot};
use crate::nn::{AttentionDeconvNet, Device, PoolingMode};
use crate::tensor::Tensor;
use rand::Rng;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

/// 注意力自反馈模拟的默认步数
pub const SIMULATION_STEPS: usize = 800;

pub struct Validator<D> {
    model: AttentionDeconvNet,
    data: D,
}

impl<D: ImageDataset> Validator<D> {
    pub fn new(model: AttentionDeconvNet, data: D) -> Self {
        Self { model, data }
    }

    pub fn load<P: AsRef<Path>>(checkpoint: P, device: Device, data: D) -> Result<Self, TrainError> {
        Ok(Self::new(AttentionDeconvNet::load(checkpoint, device)?, data))
    }

    pub fn model(&self) -> &AttentionDeconvNet {
        &self.model
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// 预测概率[batch, num_classes]；`attention`给出时以其 one-hot 作为注意力信号
    pub fn predict(&self, x: &Tensor, attention: Option<&[usize]>) -> Result<Tensor, TrainError> {
        match attention {
            Some(labels) => {
                let aux = one_hot(labels, self.model.config().aux_dim)?;
                let (probs, _) = self.model.forward_with_attention(x, &aux, None, PoolingMode::Plain)?;
                Ok(probs)
            }
            None => Ok(self.model.predict(x)?),
        }
    }

    /// 反复随机抽一个样本，输出下标、真实标签与预测，读到`q`（或输入结束）时退出。
    /// 返回已检查的样本数
    pub fn inspect_random<R, W, G>(
        &self,
        test: bool,
        attention: bool,
        rng: &mut G,
        mut input: R,
        mut output: W,
    ) -> Result<usize, TrainError>
    where
        R: BufRead,
        W: Write,
        G: Rng + ?Sized,
    {
        let n = self.data.len_of(test);
        if n == 0 {
            return Err(TrainError::EmptyDataset(if test { "测试集" } else { "训练集" }));
        }
        writeln!(output, "start validation!")?;
        let mut rounds = 0;
        loop {
            let index = rng.gen_range(0..n);
            let (x, labels) = self.data.get(&[index], test)?;
            let probs = self.predict(&x, attention.then_some(labels.as_slice()))?;
            rounds += 1;

            writeln!(output, "index is {index}")?;
            writeln!(output, "ground truth: {}", labels[0])?;
            writeln!(output, "prediction: {:?}", probs.data_as_slice())?;
            writeln!(output, "Press q to quit.")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 || line.trim() == "q" {
                return Ok(rounds);
            }
        }
    }

    /// 在整个数据集上逐个样本计算 top-1 准确率
    pub fn validate_all(&self, test: bool, attention: bool) -> Result<f32, TrainError> {
        let n = self.data.len_of(test);
        if n == 0 {
            return Err(TrainError::EmptyDataset(if test { "测试集" } else { "训练集" }));
        }
        let mut hits = 0usize;
        for index in 0..n {
            let (x, labels) = self.data.get(&[index], test)?;
            let probs = self.predict(&x, attention.then_some(labels.as_slice()))?;
            let predicted = probs.argmax_rows().map_err(crate::nn::ModelError::from)?;
            if predicted[0] == labels[0] {
                hits += 1;
            }
        }
        let accuracy = hits as f32 / n as f32;
        tracing::info!("准确率 {accuracy}（{hits}/{n}）");
        Ok(accuracy)
    }

    /// 单张图像[1, C, H, W]的预测概率
    pub fn predict_sample(&self, image: &Tensor, attention: Option<usize>) -> Result<Vec<f32>, TrainError> {
        let labels = attention.map(|a| [a]);
        let probs = self.predict(image, labels.as_ref().map(|l| l.as_slice()))?;
        Ok(probs.into_vec())
    }

    /// 注意力自反馈模拟：先做一次不带注意力的预测，之后每一步
    /// 以概率 pred[0] 选择注意力类别 0（否则为 1），带该注意力重新预测，
    /// 新的预测作为下一步的依据。返回每一步预测的类别
    pub fn simulate<G: Rng + ?Sized>(&self, image: &Tensor, steps: usize, rng: &mut G) -> Result<Vec<usize>, TrainError> {
        let mut pred = self.predict_sample(image, None)?;
        let mut result = Vec::with_capacity(steps);
        for _ in 0..steps {
            let attention = if pred[0] > rng.r#gen::<f32>() { 0 } else { 1 };
            pred = self.predict_sample(image, Some(attention))?;
            let argmax = Tensor::new(&pred, &[1, pred.len()])
                .argmax_rows()
                .map_err(crate::nn::ModelError::from)?;
            result.push(argmax[0]);
        }
        tracing::debug!("simulated {steps} steps");
        Ok(result)
    }
}

/// 以 CSV（step,prediction）写出模拟结果
pub fn write_simulation_csv<P: AsRef<Path>>(path: P, result: &[usize]) -> std::io::Result<()> {
    let mut text = String::from("step,prediction\n");
    for (step, pred) in result.iter().enumerate() {
        text.push_str(&format!("{},{}\n", step + 1, pred));
    }
    fs::write(path, text)
}
