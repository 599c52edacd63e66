/*
 * @Date         : 2026-10-16
 * @Description  : 计算设备。构造模型时显式传入，而不是由全局状态决定
 */

use super::ModelError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(usize),
}

impl Device {
    /// 按命令行惯例解析：负数为 CPU，非负数为对应编号的 GPU
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index).map_or(Self::Cpu, Self::Gpu)
    }

    /// 当前只有 CPU 后端
    pub fn ensure_supported(self) -> Result<Self, ModelError> {
        match self {
            Self::Cpu => Ok(self),
            Self::Gpu(_) => Err(ModelError::UnsupportedDevice(self.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(n) => write!(f, "gpu:{n}"),
        }
    }
}
