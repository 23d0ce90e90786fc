use std::path::Path;

use annotator_core::PageNumber;
use anyhow::Context as _;
use pdf::file::FileOptions;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Engine;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn scaled(&self, scale: f32) -> PageSize {
        PageSize {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self
    }

    pub fn page_count(&self, path: impl AsRef<Path>) -> anyhow::Result<u32> {
        let path = path.as_ref();
        let file = FileOptions::cached()
            .open(path)
            .with_context(|| format!("open pdf {}", path.display()))?;
        let pages = file.num_pages();
        debug!(path = %path.display(), pages, "pdf opened");
        Ok(pages)
    }

    pub fn page_size(&self, path: impl AsRef<Path>, page: PageNumber) -> anyhow::Result<PageSize> {
        let path = path.as_ref();
        let index = page
            .checked_sub(1)
            .with_context(|| format!("invalid page number {page}"))?;
        let file = FileOptions::cached()
            .open(path)
            .with_context(|| format!("open pdf for page size: {}", path.display()))?;
        let page = file
            .get_page(index)
            .with_context(|| format!("get pdf page {page} for page size"))?;

        let rect = page
            .crop_box()
            .map_err(|err| anyhow::anyhow!(err))
            .context("get page crop box")?;
        Ok(PageSize {
            width: (rect.right - rect.left).abs().max(1.0),
            height: (rect.top - rect.bottom).abs().max(1.0),
        })
    }
}
