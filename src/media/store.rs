use crate::utils::error::PpeError;
use crate::Result;
use std::path::{Component, Path, PathBuf};

/// 媒体文件存储：uploads 存原始上传，detections 存标注产物
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [root.join("uploads"), root.join("detections")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                PpeError::MediaWrite(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn detections_dir(&self) -> PathBuf {
        self.root.join("detections")
    }

    /// 把上传内容写入 uploads 目录，返回落盘路径。
    /// 同名写入会直接覆盖，调用方负责文件名唯一性。
    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.uploads_dir().join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            PpeError::MediaWrite(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }

    /// 列出目录下以 prefix 开头的文件，按文件名排序保证确定性
    pub fn list_by_prefix(&self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        let mut matches = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str() {
                if name.starts_with(prefix) {
                    matches.push(entry.path());
                }
            }
        }
        matches.sort();
        Ok(matches)
    }

    pub async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

/// 文件名只允许单个普通路径段，拒绝目录穿越
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PpeError::InvalidInput("Empty filename".to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PpeError::InvalidInput(format!("Unsafe filename: {}", name))),
    }
}
