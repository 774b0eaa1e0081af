//! Uploads routed through the editor: images, files, and galleries.
//!
//! Batches upload concurrently and are applied only once every upload has
//! finished. If any upload fails, the ones that succeeded are deleted again
//! and nothing is applied.

use futures::future::join_all;

use kila_types::{BlockKey, BlockType, ContentBlock, serialize_gallery};

use super::BlockEditor;
use crate::error::{EditorError, EditorResult};
use crate::store::{BlobKind, StoreResult, Upload};

impl BlockEditor {
    async fn upload(&self, upload: &Upload, kind: BlobKind) -> StoreResult<String> {
        match kind {
            BlobKind::Image => self.store.upload_image(self.section_id, upload).await,
            BlobKind::File => self.store.upload_file(self.section_id, upload).await,
        }
    }

    async fn upload_batch(&self, uploads: &[Upload]) -> EditorResult<Vec<String>> {
        let results = join_all(uploads.iter().map(|u| self.upload(u, BlobKind::Image))).await;
        let mut urls = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(url) => urls.push(url),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            self.delete_blobs_best_effort(&urls).await;
            return Err(EditorError::Mutation(e));
        }
        Ok(urls)
    }

    fn expect_type(&self, key: BlockKey, expected: BlockType) -> EditorResult<ContentBlock> {
        let block = self.block(key).ok_or(EditorError::BlockNotFound(key))?;
        if block.block_type != expected {
            return Err(EditorError::WrongBlockType {
                key,
                actual: block.block_type,
                expected: expected.as_str(),
            });
        }
        Ok(block)
    }

    /// Drop freshly uploaded blobs when the step that would reference them
    /// failed.
    async fn discard_on_error<T>(&self, result: EditorResult<T>, urls: &[String]) -> EditorResult<T> {
        if result.is_err() {
            self.delete_blobs_best_effort(urls).await;
        }
        result
    }

    /// Upload an image and insert it as a new image block.
    pub async fn insert_image(
        &self,
        index: usize,
        upload: &Upload,
        width: Option<u8>,
    ) -> EditorResult<BlockKey> {
        let url = self
            .upload(upload, BlobKind::Image)
            .await
            .map_err(EditorError::Mutation)?;
        let result = self
            .insert(BlockType::Image, index, Some(url.clone()), width)
            .await;
        self.discard_on_error(result, &[url]).await
    }

    /// Upload a replacement (e.g. the cropper's output) for an image block.
    pub async fn replace_image_upload(&self, key: BlockKey, upload: &Upload) -> EditorResult<()> {
        self.expect_type(key, BlockType::Image)?;
        let url = self
            .upload(upload, BlobKind::Image)
            .await
            .map_err(EditorError::Mutation)?;
        let result = self.replace_image(key, url.clone()).await;
        self.discard_on_error(result, &[url]).await
    }

    /// Upload a file for a file block. A blank label takes the file name.
    pub async fn attach_file(&self, key: BlockKey, upload: &Upload) -> EditorResult<()> {
        self.expect_type(key, BlockType::File)?;
        let url = self
            .upload(upload, BlobKind::File)
            .await
            .map_err(EditorError::Mutation)?;
        let file_name = upload.file_name.clone();
        let stored = url.clone();
        let result = self
            .mutate_block(key, move |block| {
                if block.content.as_deref().is_none_or(|c| c.trim().is_empty()) {
                    block.content = Some(file_name);
                }
                block.image_url = Some(stored);
            })
            .await;
        self.discard_on_error(result, &[url]).await
    }

    /// Upload several images and insert them as one gallery block.
    pub async fn create_gallery(
        &self,
        index: usize,
        uploads: &[Upload],
        width: Option<u8>,
    ) -> EditorResult<BlockKey> {
        let urls = self.upload_batch(uploads).await?;
        let mut block = ContentBlock::draft(self.section_id, BlockType::Gallery, index, None, width);
        block.content = Some(serialize_gallery(&urls));
        let result = self.insert_block(block, index).await;
        self.discard_on_error(result, &urls).await
    }

    /// Upload more images onto the end of a gallery.
    pub async fn append_gallery(&self, key: BlockKey, uploads: &[Upload]) -> EditorResult<()> {
        self.expect_type(key, BlockType::Gallery)?;
        let urls = self.upload_batch(uploads).await?;
        let added = urls.clone();
        let result = self
            .mutate_block(key, move |block| {
                let mut images = block.gallery_images();
                images.extend(added);
                block.content = Some(serialize_gallery(&images));
            })
            .await;
        self.discard_on_error(result, &urls).await
    }

    /// Remove the image at `position` from a gallery.
    pub async fn remove_gallery_image(&self, key: BlockKey, position: usize) -> EditorResult<()> {
        let gallery = self.expect_type(key, BlockType::Gallery)?;
        let len = gallery.gallery_images().len();
        if position >= len {
            return Err(EditorError::IndexOutOfRange { index: position, len });
        }
        self.mutate_block(key, move |block| {
            let mut images = block.gallery_images();
            if position < images.len() {
                images.remove(position);
            }
            block.content = Some(serialize_gallery(&images));
        })
        .await
    }
}
