//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Timestamps are set by the
//! store's clock, never by the caller.

use uuid::Uuid;

use crate::error::TrueLoveResult;
use crate::models::{
    field::{CreateField, Field, FieldMode, UpdateField},
    group::{CreateGroup, Group, UpdateGroup},
    qr_code::{Assignment, CreateQrCode, QrCode},
    section::{CreateSection, Section, UpdateSection},
};

// ---------------------------------------------------------------------------
// QR token pool
// ---------------------------------------------------------------------------

pub trait QrCodeRepository: Send + Sync {
    /// Fails with `AlreadyExists` if the code is taken.
    fn create(&self, input: CreateQrCode) -> impl Future<Output = TrueLoveResult<QrCode>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<QrCode>> + Send;
    /// The token currently bound to an entity, if any.
    fn find_by_assignee(
        &self,
        entity_id: Uuid,
    ) -> impl Future<Output = TrueLoveResult<Option<QrCode>>> + Send;
    /// Any free token. Which one is unspecified.
    fn find_available(&self) -> impl Future<Output = TrueLoveResult<Option<QrCode>>> + Send;
    /// All free tokens, ordered by code.
    fn list_available(&self) -> impl Future<Output = TrueLoveResult<Vec<QrCode>>> + Send;
    /// Number of tokens ever created, bound or free.
    fn count(&self) -> impl Future<Output = TrueLoveResult<u64>> + Send;

    /// Bind a token only if it is still free.
    ///
    /// Returns `None` when the token was bound by someone else in the
    /// meantime (or does not exist).
    fn claim(
        &self,
        id: Uuid,
        assignment: Assignment,
    ) -> impl Future<Output = TrueLoveResult<Option<QrCode>>> + Send;

    /// Unbind a token and mark it free.
    fn release(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<QrCode>> + Send;
}

// ---------------------------------------------------------------------------
// Record hierarchy
// ---------------------------------------------------------------------------

pub trait GroupRepository: Send + Sync {
    fn create(&self, input: CreateGroup) -> impl Future<Output = TrueLoveResult<Group>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<Group>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateGroup,
    ) -> impl Future<Output = TrueLoveResult<Group>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<()>> + Send;
    /// Groups under `parent_id`, or top-level groups for `None`,
    /// oldest first.
    fn list_children(
        &self,
        parent_id: Option<Uuid>,
    ) -> impl Future<Output = TrueLoveResult<Vec<Group>>> + Send;
}

pub trait SectionRepository: Send + Sync {
    fn create(&self, input: CreateSection)
    -> impl Future<Output = TrueLoveResult<Section>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<Section>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateSection,
    ) -> impl Future<Output = TrueLoveResult<Section>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<()>> + Send;
    /// Sections of a group, oldest first.
    fn list_by_group(
        &self,
        group_id: Uuid,
    ) -> impl Future<Output = TrueLoveResult<Vec<Section>>> + Send;
}

pub trait FieldRepository: Send + Sync {
    fn create(&self, input: CreateField) -> impl Future<Output = TrueLoveResult<Field>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<Field>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateField,
    ) -> impl Future<Output = TrueLoveResult<Field>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = TrueLoveResult<()>> + Send;
    /// Fields of a section, oldest first.
    fn list_by_section(
        &self,
        section_id: Uuid,
    ) -> impl Future<Output = TrueLoveResult<Vec<Field>>> + Send;
    fn delete_by_section(&self, section_id: Uuid) -> impl Future<Output = TrueLoveResult<()>> + Send;

    /// Overwrite `options.valor` with a number, leaving other options.
    fn set_value(&self, id: Uuid, value: f64) -> impl Future<Output = TrueLoveResult<()>> + Send;
    /// Overwrite `options.modo`, leaving other options.
    fn set_mode(
        &self,
        id: Uuid,
        mode: FieldMode,
    ) -> impl Future<Output = TrueLoveResult<()>> + Send;
}
