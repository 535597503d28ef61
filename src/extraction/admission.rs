//! Fixed-size admission window in front of one collaborator.
//!
//! Callers beyond the window wait in the semaphore queue; if no slot frees
//! within the queue timeout the call fails with `Busy`.

use crate::error::VerifyError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct AdmissionGate {
    name: &'static str,
    capacity: usize,
    queue_timeout: Duration,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

/// Holds one slot; releasing happens on drop.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    pub fn new(name: &'static str, capacity: usize, queue_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            queue_timeout,
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn acquire(&self) -> Result<AdmissionPermit, VerifyError> {
        let waiting = self.semaphore.available_permits() == 0;
        if waiting {
            log::debug!(
                "Admission window for {} is full ({} in flight), queueing",
                self.name,
                self.in_flight()
            );
        }

        let permit =
            match tokio::time::timeout(self.queue_timeout, self.semaphore.clone().acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    return Err(VerifyError::Busy(format!("{} admission closed", self.name)))
                }
                Err(_) => {
                    log::warn!(
                        "Timed out after {:?} waiting for a {} slot",
                        self.queue_timeout,
                        self.name
                    );
                    return Err(VerifyError::Busy(format!(
                        "no {} slot became free within {:?}",
                        self.name, self.queue_timeout
                    )));
                }
            };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(AdmissionPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_in_flight_and_releases_on_drop() {
        let gate = AdmissionGate::new("extraction", 2, Duration::from_millis(50));
        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        assert_eq!(gate.in_flight(), 1);
        drop(b);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_full_window_times_out_busy() {
        let gate = AdmissionGate::new("upscale", 1, Duration::from_millis(20));
        let _held = gate.acquire().await.unwrap();
        let err = gate.acquire().await.err().unwrap();
        assert!(matches!(err, VerifyError::Busy(_)));
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_waiter_gets_freed_slot() {
        let gate = AdmissionGate::new("extraction", 1, Duration::from_secs(2));
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_counter_never_exceeds_capacity() {
        let gate = AdmissionGate::new("extraction", 3, Duration::from_secs(5));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let gate = gate.clone();
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                peak.fetch_max(gate.in_flight(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= gate.capacity());
        assert_eq!(gate.in_flight(), 0);
    }
}
