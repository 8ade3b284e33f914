use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use imgstock_record::ImgInfo;
use std::path::PathBuf;

/// Row form of an [`ImgInfo`].
///
/// SQLite only speaks `i64`, and an absent path is stored as `''` so that the
/// empty-file sweep can match on it.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ImgRow {
    pub(crate) id: String,
    pub(crate) category: String,
    pub(crate) origin: String,
    pub(crate) path: String,
    pub(crate) width: i64,
    pub(crate) height: i64,
    pub(crate) file_size: i64,
    pub(crate) uses: i64,
}

impl ImgRow {
    pub(crate) fn uses(uses: u64) -> Result<i64, Error> {
        i64::try_from(uses).or_raise(|| ErrorKind::InvalidData("uses"))
    }
}

impl TryFrom<&ImgInfo> for ImgRow {
    type Error = Error;
    fn try_from(img: &ImgInfo) -> Result<Self, Self::Error> {
        let path = match &img.path {
            Some(path) => path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            None => String::new(),
        };
        Ok(Self {
            id: img.id.clone(),
            category: img.category.clone(),
            origin: img.origin.clone(),
            path,
            width: i64::from(img.width),
            height: i64::from(img.height),
            file_size: i64::try_from(img.file_size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            uses: Self::uses(img.uses)?,
        })
    }
}

impl TryFrom<ImgRow> for ImgInfo {
    type Error = Error;
    fn try_from(row: ImgRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            category: row.category,
            origin: row.origin,
            path: match row.path.is_empty() {
                true => None,
                false => Some(PathBuf::from(row.path)),
            },
            width: u32::try_from(row.width).or_raise(|| ErrorKind::InvalidData("width"))?,
            height: u32::try_from(row.height).or_raise(|| ErrorKind::InvalidData("height"))?,
            file_size: u64::try_from(row.file_size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            uses: u64::try_from(row.uses).or_raise(|| ErrorKind::InvalidData("uses"))?,
        })
    }
}
