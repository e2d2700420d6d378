//! Hardware-device seam.
//!
//! Transaction construction runs against a `Device` so a hardware
//! wallet can own the tx secret and payment-id encryption. The session
//! is a scoped resource: [`Device::open_tx`] hands back a guard that
//! closes the session when dropped, on success and failure alike.

use crate::{stealth, CryptoError, KeyPair, PublicKey, SecretKey};

/// The narrow device interface the builder needs.
pub trait Device {
    /// Begin a signing session and generate the transaction secret key.
    fn open_tx(&self) -> SecretKey;

    /// End the signing session.
    fn close_tx(&self);

    /// Encrypt a short payment id in place with the shared secret of
    /// `(public_key, secret_key)`.
    fn encrypt_payment_id(
        &self,
        payment_id: &mut [u8; 8],
        public_key: &PublicKey,
        secret_key: &SecretKey,
    ) -> Result<(), CryptoError>;
}

/// Pure-software device: keys live in process memory.
#[derive(Debug, Default)]
pub struct SoftwareDevice;

impl Device for SoftwareDevice {
    fn open_tx(&self) -> SecretKey {
        KeyPair::generate().secret
    }

    fn close_tx(&self) {}

    fn encrypt_payment_id(
        &self,
        payment_id: &mut [u8; 8],
        public_key: &PublicKey,
        secret_key: &SecretKey,
    ) -> Result<(), CryptoError> {
        stealth::encrypt_payment_id(payment_id, public_key, secret_key)
    }
}

/// RAII guard for an open device session.
pub struct TxSession<'d> {
    device: &'d dyn Device,
    pub tx_key: SecretKey,
}

impl<'d> TxSession<'d> {
    pub fn open(device: &'d dyn Device) -> Self {
        let tx_key = device.open_tx();
        TxSession { device, tx_key }
    }

    pub fn device(&self) -> &'d dyn Device {
        self.device
    }
}

impl Drop for TxSession<'_> {
    fn drop(&mut self) {
        self.device.close_tx();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingDevice {
        opens: Cell<u32>,
        closes: Cell<u32>,
    }

    impl Device for CountingDevice {
        fn open_tx(&self) -> SecretKey {
            self.opens.set(self.opens.get() + 1);
            [1u8; 32]
        }
        fn close_tx(&self) {
            self.closes.set(self.closes.get() + 1);
        }
        fn encrypt_payment_id(
            &self,
            _: &mut [u8; 8],
            _: &PublicKey,
            _: &SecretKey,
        ) -> Result<(), CryptoError> {
            Ok(())
        }
    }

    #[test]
    fn session_closes_on_drop() {
        let dev = CountingDevice {
            opens: Cell::new(0),
            closes: Cell::new(0),
        };
        {
            let session = TxSession::open(&dev);
            assert_eq!(session.tx_key, [1u8; 32]);
            assert_eq!(dev.opens.get(), 1);
            assert_eq!(dev.closes.get(), 0);
        }
        assert_eq!(dev.closes.get(), 1);
    }

    #[test]
    fn session_closes_on_panic_path() {
        let dev = CountingDevice {
            opens: Cell::new(0),
            closes: Cell::new(0),
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = TxSession::open(&dev);
            panic!("builder failed");
        }));
        assert!(result.is_err());
        assert_eq!(dev.closes.get(), 1);
    }

    #[test]
    fn software_device_generates_distinct_keys() {
        let dev = SoftwareDevice;
        assert_ne!(dev.open_tx(), dev.open_tx());
    }
}
