//! Integration tests for the QR label pool using in-memory SurrealDB.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use truelove_core::error::{TrueLoveError, TrueLoveResult};
use truelove_core::models::qr_code::{Assignment, CreateQrCode, EntityType, QrCode};
use truelove_core::repository::QrCodeRepository;
use truelove_db::repository::SurrealQrCodeRepository;
use truelove_records::{QrManager, RecordsConfig};
use uuid::Uuid;

/// Helper: spin up in-memory DB, run migrations and build a manager.
async fn setup() -> (SurrealQrCodeRepository<Db>, QrManager<SurrealQrCodeRepository<Db>>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    truelove_db::run_migrations(&db).await.unwrap();

    let repo = SurrealQrCodeRepository::new(db);
    let manager = QrManager::new(repo.clone(), RecordsConfig::default());
    (repo, manager)
}

#[tokio::test]
async fn first_token_is_minted_bound_then_reused_after_release() {
    let (repo, qr) = setup().await;
    let g1 = Uuid::new_v4();
    let g2 = Uuid::new_v4();

    let token = qr.assign(EntityType::Group, g1).await.unwrap();
    assert_eq!(token.code, "QR001");
    assert!(!token.available);
    assert_eq!(token.assigned_to, Some(g1));
    assert_eq!(token.assigned_type, Some(EntityType::Group));

    let freed = qr.release(g1).await.unwrap().unwrap();
    assert_eq!(freed.id, token.id);
    assert!(freed.available);
    assert_eq!(freed.assigned_to, None);
    assert_eq!(freed.assigned_type, None);

    let reused = qr.assign(EntityType::Group, g2).await.unwrap();
    assert_eq!(reused.id, token.id);
    assert_eq!(reused.code, "QR001");
    assert_eq!(reused.assigned_to, Some(g2));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn assign_twice_returns_same_token() {
    let (repo, qr) = setup().await;
    let section = Uuid::new_v4();

    let first = qr.assign(EntityType::Section, section).await.unwrap();
    let second = qr.assign(EntityType::Section, section).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn second_entity_gets_next_sequential_code() {
    let (_, qr) = setup().await;

    let a = qr.assign(EntityType::Group, Uuid::new_v4()).await.unwrap();
    let b = qr.assign(EntityType::Group, Uuid::new_v4()).await.unwrap();

    assert_eq!(a.code, "QR001");
    assert_eq!(b.code, "QR002");
    assert_eq!(qr.next_sequential_code().await.unwrap(), "QR003");
}

#[tokio::test]
async fn release_without_token_is_a_no_op() {
    let (repo, qr) = setup().await;

    assert!(qr.release(Uuid::new_v4()).await.unwrap().is_none());
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn provisioned_tokens_are_used_before_minting() {
    let (repo, qr) = setup().await;

    let provisioned = qr.provision(2).await.unwrap();
    let codes: Vec<&str> = provisioned.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["QR001", "QR002"]);
    assert!(provisioned.iter().all(|t| t.available));

    let token = qr.assign(EntityType::Group, Uuid::new_v4()).await.unwrap();
    assert!(provisioned.iter().any(|t| t.id == token.id));
    assert_eq!(repo.count().await.unwrap(), 2);
    assert_eq!(qr.available().await.unwrap().len(), 1);
}

#[tokio::test]
async fn change_binds_a_different_token_and_frees_the_old_one() {
    let (repo, qr) = setup().await;
    let entity = Uuid::new_v4();

    let old = qr.assign(EntityType::Group, entity).await.unwrap();
    let new = qr.change(EntityType::Group, entity).await.unwrap();

    assert_ne!(new.id, old.id);
    assert_eq!(new.code, "QR002");
    assert_eq!(new.assigned_to, Some(entity));

    let old_now = repo.get_by_id(old.id).await.unwrap();
    assert!(old_now.available);
    assert_eq!(old_now.assigned_to, None);

    assert_eq!(qr.current(entity).await.unwrap().unwrap().id, new.id);
}

#[tokio::test]
async fn change_prefers_a_free_token() {
    let (_, qr) = setup().await;
    let entity = Uuid::new_v4();

    let old = qr.assign(EntityType::Section, entity).await.unwrap();
    let spare = qr.provision(1).await.unwrap().remove(0);

    let new = qr.change(EntityType::Section, entity).await.unwrap();
    assert_eq!(new.id, spare.id);

    // The old token is the only free one left.
    let free = qr.available().await.unwrap();
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].id, old.id);
}

#[tokio::test]
async fn change_to_picks_the_requested_free_token() {
    let (_, qr) = setup().await;
    let entity = Uuid::new_v4();

    let old = qr.assign(EntityType::Group, entity).await.unwrap();
    let spares = qr.provision(2).await.unwrap();

    let picked = qr
        .change_to(EntityType::Group, entity, spares[1].id)
        .await
        .unwrap();
    assert_eq!(picked.id, spares[1].id);
    assert_eq!(picked.assigned_to, Some(entity));

    let free_ids: Vec<Uuid> = qr.available().await.unwrap().iter().map(|t| t.id).collect();
    assert!(free_ids.contains(&old.id));
    assert!(free_ids.contains(&spares[0].id));
    assert!(!free_ids.contains(&spares[1].id));
}

#[tokio::test]
async fn change_to_own_token_is_unchanged() {
    let (_, qr) = setup().await;
    let entity = Uuid::new_v4();

    let token = qr.assign(EntityType::Group, entity).await.unwrap();
    let same = qr
        .change_to(EntityType::Group, entity, token.id)
        .await
        .unwrap();

    assert_eq!(same.id, token.id);
    assert!(!same.available);
}

#[tokio::test]
async fn change_to_token_bound_elsewhere_is_rejected() {
    let (_, qr) = setup().await;
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    let taken = qr.assign(EntityType::Group, owner).await.unwrap();
    let mine = qr.assign(EntityType::Group, other).await.unwrap();

    let err = qr
        .change_to(EntityType::Group, other, taken.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TrueLoveError::AlreadyAssigned { ref code } if code == "QR001"));

    // Neither entity lost its token.
    assert_eq!(qr.current(owner).await.unwrap().unwrap().id, taken.id);
    assert_eq!(qr.current(other).await.unwrap().unwrap().id, mine.id);
}

#[tokio::test]
async fn change_to_unknown_token_is_not_found() {
    let (_, qr) = setup().await;

    let err = qr
        .change_to(EntityType::Section, Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, TrueLoveError::NotFound { .. }));
}

#[tokio::test]
async fn assign_steps_over_a_code_taken_outside_the_pool() {
    let (repo, qr) = setup().await;

    // Imported label: the pool holds one token, but its code is QR002.
    repo.create(CreateQrCode {
        code: "QR002".into(),
        assignment: Some(Assignment {
            entity_type: EntityType::Group,
            entity_id: Uuid::new_v4(),
        }),
    })
    .await
    .unwrap();
    assert_eq!(repo.count().await.unwrap(), 1);

    let token = qr.assign(EntityType::Group, Uuid::new_v4()).await.unwrap();
    assert_eq!(token.code, "QR003");

    // The next mint is back on the plain count.
    let next = qr.assign(EntityType::Group, Uuid::new_v4()).await.unwrap();
    assert_eq!(next.code, "QR004");
}

// ---------------------------------------------------------------------------
// Contention, driven through an in-process pool
// ---------------------------------------------------------------------------

/// Pool whose `claim` can be made to lose and whose `create` can be
/// made to collide. Managers borrow it so tests can inspect it after.
#[derive(Default)]
struct ContendedPool {
    tokens: Mutex<Vec<QrCode>>,
    claims_to_lose: AtomicU32,
    claim_calls: AtomicU32,
    reject_creates: bool,
    attempted_codes: Mutex<Vec<String>>,
}

impl ContendedPool {
    fn with_free_token(code: &str) -> Self {
        let pool = Self::default();
        pool.tokens.lock().unwrap().push(token(code, None));
        pool
    }
}

fn token(code: &str, assignment: Option<Assignment>) -> QrCode {
    QrCode {
        id: Uuid::new_v4(),
        code: code.into(),
        available: assignment.is_none(),
        assigned_to: assignment.map(|a| a.entity_id),
        assigned_type: assignment.map(|a| a.entity_type),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

impl QrCodeRepository for &ContendedPool {
    async fn create(&self, input: CreateQrCode) -> TrueLoveResult<QrCode> {
        self.attempted_codes.lock().unwrap().push(input.code.clone());
        if self.reject_creates {
            return Err(TrueLoveError::AlreadyExists {
                entity: format!("qr_code {}", input.code),
            });
        }
        let created = token(&input.code, input.assignment);
        self.tokens.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> TrueLoveResult<QrCode> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(TrueLoveError::NotFound {
                entity: "qr_code".into(),
                id: id.to_string(),
            })
    }

    async fn find_by_assignee(&self, entity_id: Uuid) -> TrueLoveResult<Option<QrCode>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.is_bound_to(entity_id))
            .cloned())
    }

    async fn find_available(&self) -> TrueLoveResult<Option<QrCode>> {
        Ok(self.tokens.lock().unwrap().iter().find(|t| t.available).cloned())
    }

    async fn list_available(&self) -> TrueLoveResult<Vec<QrCode>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.available)
            .cloned()
            .collect())
    }

    async fn count(&self) -> TrueLoveResult<u64> {
        Ok(self.tokens.lock().unwrap().len() as u64)
    }

    async fn claim(&self, id: Uuid, assignment: Assignment) -> TrueLoveResult<Option<QrCode>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let lost = self
            .claims_to_lose
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Ok(None);
        }

        let mut tokens = self.tokens.lock().unwrap();
        let Some(t) = tokens.iter_mut().find(|t| t.id == id && t.available) else {
            return Ok(None);
        };
        t.available = false;
        t.assigned_to = Some(assignment.entity_id);
        t.assigned_type = Some(assignment.entity_type);
        Ok(Some(t.clone()))
    }

    async fn release(&self, id: Uuid) -> TrueLoveResult<QrCode> {
        let mut tokens = self.tokens.lock().unwrap();
        let t = tokens.iter_mut().find(|t| t.id == id).unwrap();
        t.available = true;
        t.assigned_to = None;
        t.assigned_type = None;
        Ok(t.clone())
    }
}

#[tokio::test]
async fn lost_claim_is_retried() {
    let pool = ContendedPool::with_free_token("QR001");
    pool.claims_to_lose.store(1, Ordering::SeqCst);
    let qr = QrManager::new(&pool, RecordsConfig::default());
    let entity = Uuid::new_v4();

    let token = qr.assign(EntityType::Section, entity).await.unwrap();
    assert_eq!(token.code, "QR001");
    assert_eq!(token.assigned_to, Some(entity));
    assert_eq!(pool.claim_calls.load(Ordering::SeqCst), 2);
    assert!(pool.attempted_codes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn persistent_claim_contention_is_store_unavailable() {
    let pool = ContendedPool::with_free_token("QR001");
    pool.claims_to_lose.store(u32::MAX, Ordering::SeqCst);
    let qr = QrManager::new(
        &pool,
        RecordsConfig {
            claim_attempts: 5,
            ..Default::default()
        },
    );

    let err = qr
        .assign(EntityType::Group, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, TrueLoveError::StoreUnavailable(_)));
    assert_eq!(pool.claim_calls.load(Ordering::SeqCst), 5);

    // Contention on a free token never falls through to minting.
    assert!(pool.attempted_codes.lock().unwrap().is_empty());
    assert_eq!(qr.available().await.unwrap().len(), 1);
}

#[tokio::test]
async fn colliding_mints_try_successive_codes_then_give_up() {
    let pool = ContendedPool {
        reject_creates: true,
        ..Default::default()
    };
    let qr = QrManager::new(&pool, RecordsConfig::default());

    let err = qr
        .assign(EntityType::Group, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, TrueLoveError::StoreUnavailable(_)));
    assert_eq!(
        *pool.attempted_codes.lock().unwrap(),
        vec!["QR001", "QR002", "QR003"]
    );
}
