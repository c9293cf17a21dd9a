use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::models::Booking;
use crate::repository::{BookingStore, BookingUnitOfWork, StoreError};

/// In-memory booking store, keyed by PNR.
///
/// Units of work stage their writes locally and apply them under a single
/// write lock on commit, so an abandoned unit of work leaves no trace.
///
/// A locking read through a unit of work takes the store's row gate and holds
/// it until commit or drop, so read-modify-write cycles run one at a time.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<String, Booking>>>,
    row_gate: Arc<Mutex<()>>,
    next_id: Arc<AtomicI64>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookings.read().await.is_empty()
    }

    /// Number of `save` calls made through any unit of work, committed or not.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Place a booking directly into the store, assigning an id if it has none.
    pub async fn insert(&self, mut booking: Booking) -> Booking {
        if booking.id.is_none() {
            booking.id = Some(self.allocate_id());
        }
        self.bookings
            .write()
            .await
            .insert(booking.pnr.clone(), booking.clone());
        booking
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            staged: Vec::new(),
            gate: None,
        }))
    }

    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(pnr).cloned())
    }

    async fn find_by_owner_ordered_by_created_desc(
        &self,
        email: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        let mut owned: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_email == email)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(owned)
    }
}

struct MemoryUnitOfWork {
    store: InMemoryBookingStore,
    staged: Vec<Booking>,
    gate: Option<OwnedMutexGuard<()>>,
}

impl MemoryUnitOfWork {
    fn staged(&self, pnr: &str) -> Option<&Booking> {
        self.staged.iter().rev().find(|b| b.pnr == pnr)
    }
}

#[async_trait]
impl BookingUnitOfWork for MemoryUnitOfWork {
    async fn find_by_pnr(&mut self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        if self.gate.is_none() {
            self.gate = Some(self.store.row_gate.clone().lock_owned().await);
        }
        if let Some(booking) = self.staged(pnr) {
            return Ok(Some(booking.clone()));
        }
        self.store.find_by_pnr(pnr).await
    }

    async fn save(&mut self, mut booking: Booking) -> Result<Booking, StoreError> {
        self.store.saves.fetch_add(1, Ordering::SeqCst);

        let committed = self.store.find_by_pnr(&booking.pnr).await?;
        match booking.id {
            None => {
                if committed.is_some() || self.staged(&booking.pnr).is_some() {
                    return Err(StoreError::DuplicatePnr(booking.pnr));
                }
                booking.id = Some(self.store.allocate_id());
            }
            Some(_) => {
                if committed.is_none() && self.staged(&booking.pnr).is_none() {
                    return Err(StoreError::Missing(booking.pnr));
                }
            }
        }

        self.staged.retain(|b| b.pnr != booking.pnr);
        self.staged.push(booking.clone());
        Ok(booking)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork {
            store,
            staged,
            gate: _gate,
        } = *self;
        let mut bookings = store.bookings.write().await;

        // Another unit of work may have committed the same reference meanwhile.
        for booking in &staged {
            if let Some(existing) = bookings.get(&booking.pnr) {
                if existing.id != booking.id {
                    return Err(StoreError::DuplicatePnr(booking.pnr.clone()));
                }
            }
        }

        for booking in staged {
            bookings.insert(booking.pnr.clone(), booking);
        }
        Ok(())
    }
}
