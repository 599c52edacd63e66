//! # Attn Deconv
//!
//! `attn_deconv`是一个带注意力门的卷积图像分类网络：
//! 图像经分块卷积提取特征，辅助的类别信号经 sigmoid 投影成注意力门并逐元素乘入特征，再做分类。
//!
//! 为了查看网络学到了什么，前向时可以记录每次最大池化的开关（switch），
//! 之后沿镜像的转置卷积与反池化逐层回放，把任一 block 或注意力阶段的激活重建回输入空间。
//!
//! 模块：
//! - [`tensor`]：基于`ndarray`的张量
//! - [`nn`]：网络层、模型、反卷积重建与优化器
//! - [`data`]：图像数据集
//! - [`train`]：训练循环与验证
//! - [`vision`]：重建结果导出
//!

pub mod data;
pub mod errors;
pub mod nn;
pub mod tensor;
pub mod train;
pub mod vision;
