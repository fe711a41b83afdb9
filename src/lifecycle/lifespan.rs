use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::utils::IssuedCertificate;

/// Remaining validity of the current certificate and the point at which it
/// should be rotated.
///
/// `rotate_at` is `validity / refresh_rate`: with a rate of 2 a certificate
/// valid for 24h is rotated once 12h or less remain. Both values are zero when
/// there is no usable certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifespan {
    pub remain: Duration,
    pub rotate_at: Duration,
}

impl Lifespan {
    /// No certificate, an expired one, or a pending revoke.
    pub const EXPIRED: Lifespan = Lifespan { remain: Duration::ZERO, rotate_at: Duration::ZERO };

    /// Compute the lifespan of `certificate` at `now`.
    pub fn at(
        certificate: Option<&IssuedCertificate>,
        now: DateTime<Utc>,
        refresh_rate: u32,
    ) -> Self {
        let Some(certificate) = certificate else {
            return Self::EXPIRED;
        };
        if certificate.is_expired_at(now) {
            return Self::EXPIRED;
        }

        Self {
            remain: certificate.remaining_at(now),
            rotate_at: certificate.validity() / refresh_rate.max(1),
        }
    }

    /// True when the certificate can still be presented in a handshake.
    pub fn is_live(&self) -> bool {
        !self.remain.is_zero()
    }

    /// True when the rotation loop should refresh: `remain <= rotate_at`.
    pub fn rotation_due(&self) -> bool {
        self.remain <= self.rotate_at
    }

    /// True when the refresh protocol may skip signing.
    pub fn is_fresh(&self) -> bool {
        !self.rotate_at.is_zero() && self.remain >= self.rotate_at
    }
}
