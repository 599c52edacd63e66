/*
 * @Date         : 2026-10-16
 * @Description  : 张量层面的错误类型（形状、维度、池化窗口等）
 */

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("形状不匹配：期望{expected:?}，得到{got:?}。{message}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },
    #[error("{op}需要{expected}维张量，得到{got}维")]
    DimensionMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    // 池化、卷积的窗口比输入还大
    #[error("窗口{window:?}超出输入尺寸{input:?}")]
    WindowTooLarge {
        window: (usize, usize),
        input: (usize, usize),
    },
    #[error("张量形状不兼容：{from:?}无法变为{to:?}")]
    IncompatibleShape { from: Vec<usize>, to: Vec<usize> },
    #[error("张量列表为空")]
    EmptyList,
}

impl TensorError {
    pub(crate) fn shape_mismatch(expected: &[usize], got: &[usize], message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
            message: message.into(),
        }
    }
}
