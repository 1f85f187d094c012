use crate::device::DeviceError;
use std::sync::atomic::{AtomicU64, Ordering};

const FREE: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Free,
    Open,
}

/// Single-holder gate. Each successful acquire hands out a fresh token, and
/// only the current token can release the gate.
#[derive(Debug, Default)]
pub struct AccessGate {
    holder: AtomicU64,
    epoch: AtomicU64,
}

impl AccessGate {
    pub const fn new() -> Self {
        Self {
            holder: AtomicU64::new(FREE),
            epoch: AtomicU64::new(FREE),
        }
    }

    pub fn acquire(&self) -> Result<u64, DeviceError> {
        if self.holder.load(Ordering::Acquire) != FREE {
            return Err(DeviceError::AlreadyOpen);
        }
        let token = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.holder
            .compare_exchange(FREE, token, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| token)
            .map_err(|_| DeviceError::AlreadyOpen)
    }

    pub fn release(&self, token: u64) -> bool {
        self.holder
            .compare_exchange(token, FREE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn revoke(&self) {
        self.holder.store(FREE, Ordering::Release);
    }

    pub fn is_held_by(&self, token: u64) -> bool {
        token != FREE && self.holder.load(Ordering::Acquire) == token
    }

    pub fn state(&self) -> AccessState {
        if self.holder.load(Ordering::Acquire) == FREE {
            AccessState::Free
        } else {
            AccessState::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn second_acquire_fails_until_release() {
        let gate = AccessGate::new();
        assert_eq!(gate.state(), AccessState::Free);

        let token = gate.acquire().expect("первый захват");
        assert_eq!(gate.state(), AccessState::Open);
        assert!(matches!(gate.acquire(), Err(DeviceError::AlreadyOpen)));

        assert!(gate.release(token));
        assert!(!gate.release(token));
        assert_eq!(gate.state(), AccessState::Free);
        let next = gate.acquire().expect("захват после освобождения");
        assert_ne!(next, token);
    }

    #[test]
    fn revoked_token_cannot_release_new_holder() {
        let gate = AccessGate::new();
        let old = gate.acquire().expect("захват");
        gate.revoke();
        assert!(!gate.is_held_by(old));

        let current = gate.acquire().expect("захват после отзыва");
        assert!(!gate.release(old));
        assert!(gate.is_held_by(current));
        assert_eq!(gate.state(), AccessState::Open);
        assert!(matches!(gate.acquire(), Err(DeviceError::AlreadyOpen)));
    }

    #[test]
    fn concurrent_acquire_has_one_winner() {
        let gate = Arc::new(AccessGate::new());
        let barrier = Arc::new(Barrier::new(8));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.acquire().is_ok()
                })
            })
            .collect();

        let winners = workers
            .into_iter()
            .map(|w| w.join().expect("поток"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
