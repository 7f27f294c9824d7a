//! QR label pool manager.
//!
//! Tokens are reused before new ones are minted. Every bind goes
//! through [`QrCodeRepository::claim`], a conditional update that only
//! succeeds while the token is still free, so two callers racing for
//! the same token cannot both bind it. Minting relies on the unique
//! index on `code`. Attempt `n` tries the code `n` past the current
//! count, so a code already taken by imported data is stepped over.

use tracing::{debug, info, warn};
use truelove_core::error::{TrueLoveError, TrueLoveResult};
use truelove_core::models::qr_code::{Assignment, CreateQrCode, EntityType, QrCode};
use truelove_core::repository::QrCodeRepository;
use uuid::Uuid;

use crate::config::RecordsConfig;
use crate::error::RecordsError;

/// Allocator for the shared pool of printable QR labels.
///
/// Generic over the repository so that the pool logic has no
/// dependency on the database crate.
pub struct QrManager<Q: QrCodeRepository> {
    repo: Q,
    config: RecordsConfig,
}

impl<Q: QrCodeRepository> QrManager<Q> {
    pub fn new(repo: Q, config: RecordsConfig) -> Self {
        Self { repo, config }
    }

    /// Bind a token to an entity.
    ///
    /// Returns the entity's current token unchanged if it already has
    /// one; otherwise claims a free token, minting a new one only when
    /// the pool has none left.
    pub async fn assign(&self, entity_type: EntityType, entity_id: Uuid) -> TrueLoveResult<QrCode> {
        if let Some(token) = self.repo.find_by_assignee(entity_id).await? {
            debug!(%entity_id, code = %token.code, "Entity already holds a QR code");
            return Ok(token);
        }

        let token = self
            .bind_new(Assignment {
                entity_type,
                entity_id,
            })
            .await?;

        info!(
            %entity_id,
            entity_type = %entity_type,
            code = %token.code,
            "QR code assigned"
        );

        Ok(token)
    }

    /// Free the token bound to an entity.
    ///
    /// An entity without a token is a no-op. Returns the freed token.
    pub async fn release(&self, entity_id: Uuid) -> TrueLoveResult<Option<QrCode>> {
        let Some(token) = self.repo.find_by_assignee(entity_id).await? else {
            debug!(%entity_id, "No QR code to release");
            return Ok(None);
        };

        let freed = self.repo.release(token.id).await?;
        info!(%entity_id, code = %freed.code, "QR code released");

        Ok(Some(freed))
    }

    /// Bind a different token to an entity and free the old one.
    ///
    /// The new token is claimed first. The old token is still bound at
    /// that point, so the pool can never hand it back, and a failure
    /// between the two steps leaves the entity holding two tokens
    /// rather than none.
    pub async fn change(&self, entity_type: EntityType, entity_id: Uuid) -> TrueLoveResult<QrCode> {
        let previous = self.repo.find_by_assignee(entity_id).await?;

        let token = self
            .bind_new(Assignment {
                entity_type,
                entity_id,
            })
            .await?;

        if let Some(previous) = &previous {
            self.repo.release(previous.id).await?;
        }

        info!(
            %entity_id,
            previous = previous.as_ref().map(|p| p.code.as_str()).unwrap_or("none"),
            code = %token.code,
            "QR code changed"
        );

        Ok(token)
    }

    /// Bind a specific free token, picked by the user, to an entity.
    pub async fn change_to(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        token_id: Uuid,
    ) -> TrueLoveResult<QrCode> {
        let token = self.repo.get_by_id(token_id).await?;

        if token.is_bound_to(entity_id) {
            return Ok(token);
        }
        if !token.available {
            return Err(RecordsError::TokenTaken { code: token.code }.into());
        }

        let previous = self.repo.find_by_assignee(entity_id).await?;

        let claimed = self
            .repo
            .claim(
                token_id,
                Assignment {
                    entity_type,
                    entity_id,
                },
            )
            .await?
            .ok_or(RecordsError::TokenTaken { code: token.code })?;

        if let Some(previous) = &previous {
            self.repo.release(previous.id).await?;
        }

        info!(%entity_id, code = %claimed.code, "QR code picked manually");

        Ok(claimed)
    }

    /// Free tokens, ordered by code.
    pub async fn available(&self) -> TrueLoveResult<Vec<QrCode>> {
        self.repo.list_available().await
    }

    /// The token currently bound to an entity.
    pub async fn current(&self, entity_id: Uuid) -> TrueLoveResult<Option<QrCode>> {
        self.repo.find_by_assignee(entity_id).await
    }

    /// Pre-provision `count` free tokens with sequential codes.
    pub async fn provision(&self, count: u32) -> TrueLoveResult<Vec<QrCode>> {
        let mut tokens = Vec::with_capacity(count as usize);
        for _ in 0..count {
            tokens.push(self.mint(None).await?);
        }

        info!(count, "QR codes provisioned");

        Ok(tokens)
    }

    /// Code for the next token to mint, derived from the number of
    /// tokens ever created.
    pub async fn next_sequential_code(&self) -> TrueLoveResult<String> {
        let total = self.repo.count().await?;
        Ok(QrCode::sequential_code(total + 1))
    }

    async fn bind_new(&self, assignment: Assignment) -> TrueLoveResult<QrCode> {
        match self.claim_free(assignment).await? {
            Some(token) => Ok(token),
            None => self.mint(Some(assignment)).await,
        }
    }

    /// Claim any free token. `None` when the pool has none.
    async fn claim_free(&self, assignment: Assignment) -> TrueLoveResult<Option<QrCode>> {
        for attempt in 1..=self.config.claim_attempts {
            let Some(candidate) = self.repo.find_available().await? else {
                return Ok(None);
            };

            if let Some(token) = self.repo.claim(candidate.id, assignment).await? {
                return Ok(Some(token));
            }

            debug!(code = %candidate.code, attempt, "Lost claim on free QR code");
        }

        Err(RecordsError::ClaimContention {
            attempts: self.config.claim_attempts,
        }
        .into())
    }

    async fn mint(&self, assignment: Option<Assignment>) -> TrueLoveResult<QrCode> {
        for attempt in 1..=self.config.mint_attempts {
            let total = self.repo.count().await?;
            let code = QrCode::sequential_code(total + u64::from(attempt));

            match self
                .repo
                .create(CreateQrCode {
                    code: code.clone(),
                    assignment,
                })
                .await
            {
                Ok(token) => return Ok(token),
                Err(TrueLoveError::AlreadyExists { .. }) => {
                    warn!(%code, attempt, "QR code already minted, trying the next one");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RecordsError::MintContention {
            attempts: self.config.mint_attempts,
        }
        .into())
    }
}
