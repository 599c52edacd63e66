/*
 * @Date         : 2026-10-16
 * @Description  : 检查点文件的读写
 *
 * 文件格式：
 * - [0-3]  魔数（模型为 ADMD，优化器状态为 ADOP）
 * - [4-7]  版本号（u32，小端）
 * - [8-]   bincode 负载
 */

use super::ModelError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub(crate) const CHECKPOINT_VERSION: u32 = 1;

pub(crate) fn write_checkpoint<T: Serialize, P: AsRef<Path>>(
    path: P,
    magic: &[u8; 4],
    payload: &T,
) -> Result<(), ModelError> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(magic)?;
    writer.write_all(&CHECKPOINT_VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut writer, payload)?;
    writer.flush()?;
    Ok(())
}

pub(crate) fn read_checkpoint<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
    magic: &[u8; 4],
) -> Result<T, ModelError> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);

    let mut found = [0u8; 4];
    reader.read_exact(&mut found)?;
    if &found != magic {
        return Err(ModelError::InvalidCheckpoint(format!(
            "魔数为{:?}，期望{:?}",
            String::from_utf8_lossy(&found),
            String::from_utf8_lossy(magic)
        )));
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != CHECKPOINT_VERSION {
        return Err(ModelError::InvalidCheckpoint(format!("不支持的版本: {version}")));
    }

    Ok(bincode::deserialize_from(reader)?)
}
