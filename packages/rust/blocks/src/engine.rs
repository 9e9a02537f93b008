//! Assembly engine: staging prepared layouts, resolving the block payload of a
//! write, and editing an existing document's blocks in place.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use plone_mcp_shared::{
    BlockMap, BlockSet, BlockSpec, PloneMcpError, Result, TITLE_BLOCK_TYPE, WriteKind,
    block_type_of,
};

use crate::collaborators::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::image::ImageChecker;
use crate::normalize::Normalizer;
use crate::registry::{BlockKind, SchemaRegistry};
use crate::staging::{STAGING_TTL_SECS, StagingSlot};
use crate::title::enforce_title;

/// What a successful [`AssemblyEngine::stage`] call reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReceipt {
    /// New ids, one per input spec, in input order.
    pub block_ids: Vec<String>,
    /// Block type of each id in `block_ids`.
    pub types: Vec<String>,
    /// Render order of the staged blocks.
    pub layout: Vec<String>,
    pub expires_in_secs: i64,
}

pub struct AssemblyEngine {
    registry: Arc<SchemaRegistry>,
    normalizer: Normalizer,
    ids: Arc<dyn IdGenerator>,
    staging: StagingSlot,
}

impl AssemblyEngine {
    /// Engine with random ids and the system clock.
    pub fn new(registry: Arc<SchemaRegistry>, images: Arc<dyn ImageChecker>) -> Self {
        Self::with_collaborators(
            registry,
            images,
            Arc::new(UuidGenerator),
            Arc::new(SystemClock),
        )
    }

    pub fn with_collaborators(
        registry: Arc<SchemaRegistry>,
        images: Arc<dyn ImageChecker>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            normalizer: Normalizer::new(images),
            ids,
            staging: StagingSlot::new(clock),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Normalize every spec and stage the result, replacing any earlier stage.
    ///
    /// One failing spec fails the whole batch and clears the slot.
    #[instrument(skip_all, fields(count = specs.len()))]
    pub async fn stage(&self, specs: Vec<BlockSpec>) -> Result<StageReceipt> {
        match self.build(specs).await {
            Ok((set, block_ids, types)) => {
                let layout = set.layout.clone();
                self.staging.stage(set).await;
                info!(blocks = block_ids.len(), "blocks staged");
                Ok(StageReceipt {
                    block_ids,
                    types,
                    layout,
                    expires_in_secs: STAGING_TTL_SECS,
                })
            }
            Err(e) => {
                warn!(error = %e, "staging failed, clearing staged layout");
                self.staging.clear().await;
                Err(e)
            }
        }
    }

    async fn build(&self, specs: Vec<BlockSpec>) -> Result<(BlockSet, Vec<String>, Vec<String>)> {
        let mut set = BlockSet::default();
        let mut block_ids = Vec::with_capacity(specs.len());
        let mut types = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            let block_type = self
                .registry
                .resolve(&spec.block_type)
                .map_err(|e| e.within(format!("block {index}")))?;
            let record = self
                .normalizer
                .normalize(&block_type, spec.data)
                .await
                .map_err(|e| e.within(format!("block {index}")))?;
            let id = self.fresh_id(&set.blocks);
            set.blocks.insert(id.clone(), record);
            insert_at(&mut set.layout, spec.position, id.clone());
            block_ids.push(id);
            types.push(block_type.name().to_string());
        }
        Ok((set, block_ids, types))
    }

    /// Decide which blocks a create/update sends.
    ///
    /// A live staged layout wins and is consumed; otherwise supplied data is used.
    /// `None` means the update must leave the document's blocks untouched.
    #[instrument(skip_all, fields(?kind, supplied_blocks = blocks.is_some(), supplied_layout = layout.is_some()))]
    pub async fn resolve_for_write(
        &self,
        blocks: Option<BlockMap>,
        layout: Option<Vec<String>>,
        kind: WriteKind,
    ) -> Option<BlockSet> {
        let staged = self.staging.take().await;
        self.assemble(staged, blocks, layout, kind)
    }

    /// [`resolve_for_write`](Self::resolve_for_write) for an update, where a layout
    /// sent without blocks reorders the blocks already stored.
    ///
    /// `stored` is awaited only when nothing live is staged and no blocks were
    /// supplied, after the staged slot has been consumed.
    #[instrument(skip_all, fields(supplied_blocks = blocks.is_some(), supplied_layout = layout.is_some()))]
    pub async fn resolve_for_update<F, Fut>(
        &self,
        blocks: Option<BlockMap>,
        layout: Option<Vec<String>>,
        stored: F,
    ) -> Result<Option<BlockSet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BlockMap>>,
    {
        let staged = self.staging.take().await;
        let blocks = match blocks {
            None if staged.is_none() && layout.is_some() => {
                debug!("reordering stored blocks");
                Some(stored().await?)
            }
            blocks => blocks,
        };
        Ok(self.assemble(staged, blocks, layout, WriteKind::Update))
    }

    fn assemble(
        &self,
        staged: Option<BlockSet>,
        blocks: Option<BlockMap>,
        layout: Option<Vec<String>>,
        kind: WriteKind,
    ) -> Option<BlockSet> {
        let mut set = if let Some(staged) = staged {
            debug!(blocks = staged.blocks.len(), "using staged layout");
            staged
        } else if blocks.is_some() || layout.is_some() {
            BlockSet::new(blocks.unwrap_or_default(), layout.unwrap_or_default())
        } else if kind == WriteKind::Update {
            debug!("no block changes requested");
            return None;
        } else {
            BlockSet::default()
        };
        enforce_title(&mut set, || self.ids.next_id());
        Some(set)
    }

    pub async fn discard_staged(&self) {
        self.staging.clear().await;
    }

    pub async fn has_staged(&self) -> bool {
        self.staging.is_staged().await
    }

    // -----------------------------------------------------------------------
    // Editing fetched documents
    // -----------------------------------------------------------------------

    /// Normalize `spec` and insert it into `set`, returning the new block id.
    #[instrument(skip_all, fields(block_type = %spec.block_type, position = ?spec.position))]
    pub async fn add_block(&self, set: &mut BlockSet, spec: BlockSpec) -> Result<String> {
        let block_type = self.registry.resolve(&spec.block_type)?;
        if block_type.kind() == BlockKind::Title {
            return Err(PloneMcpError::validation(format!(
                "a document always has exactly one '{TITLE_BLOCK_TYPE}' block; it cannot be added"
            )));
        }
        let record = self.normalizer.normalize(&block_type, spec.data).await?;

        let id = self.fresh_id(&set.blocks);
        set.blocks.insert(id.clone(), record);
        insert_at(&mut set.layout, spec.position, id.clone());
        enforce_title(set, || self.ids.next_id());
        debug!(%id, "block added");
        Ok(id)
    }

    /// Merge `patch` into block `block_id`. Fields the block kind cares about are
    /// normalized first.
    #[instrument(skip(self, set, patch))]
    pub async fn update_block(
        &self,
        set: &mut BlockSet,
        block_id: &str,
        patch: Map<String, Value>,
    ) -> Result<()> {
        let existing = set
            .blocks
            .get(block_id)
            .ok_or_else(|| PloneMcpError::not_found("block", block_id, set.ids()))?;
        let block_type = self
            .registry
            .classify(block_type_of(existing).unwrap_or_default());

        let patch = self.normalizer.normalize_patch(&block_type, patch).await?;

        if let Some(block) = set.blocks.get_mut(block_id) {
            match block {
                Value::Object(fields) => fields.extend(patch),
                other => *other = Value::Object(patch),
            }
        }
        enforce_title(set, || self.ids.next_id());
        debug!("block updated");
        Ok(())
    }

    /// Delete block `block_id` from both the mapping and the layout.
    #[instrument(skip(self, set))]
    pub fn remove_block(&self, set: &mut BlockSet, block_id: &str) -> Result<()> {
        let existing = set
            .blocks
            .get(block_id)
            .ok_or_else(|| PloneMcpError::not_found("block", block_id, set.ids()))?;
        if block_type_of(existing) == Some(TITLE_BLOCK_TYPE) {
            return Err(PloneMcpError::validation(format!(
                "block '{block_id}' is the '{TITLE_BLOCK_TYPE}' block and cannot be removed"
            )));
        }

        set.blocks.shift_remove(block_id);
        set.layout.retain(|id| id != block_id);
        enforce_title(set, || self.ids.next_id());
        debug!("block removed");
        Ok(())
    }

    /// Registry entry for `block_type`, or the whole registry plus an example.
    pub fn get_schema(&self, block_type: Option<&str>) -> Result<Value> {
        self.registry.describe(block_type)
    }

    fn fresh_id(&self, taken: &BlockMap) -> String {
        loop {
            let id = self.ids.next_id();
            if !taken.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Insert `id` at `position`, appending when absent or out of range.
fn insert_at(layout: &mut Vec<String>, position: Option<usize>, id: String) {
    match position {
        Some(p) if p <= layout.len() => layout.insert(p, id),
        _ => layout.push(id),
    }
}
