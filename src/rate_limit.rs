use std::{net::IpAddr, num::NonZeroU32};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

pub struct IpRateLimiter {
    inner: DefaultKeyedRateLimiter<IpAddr>,
    per_minute: NonZeroU32,
}

impl IpRateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        let per_minute = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: RateLimiter::keyed(Quota::per_minute(per_minute)),
            per_minute,
        }
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.inner.check_key(&ip).is_ok()
    }

    pub fn limit(&self) -> u32 {
        self.per_minute.get()
    }

    pub fn prune(&self) {
        self.inner.retain_recent();
        self.inner.shrink_to_fit();
    }
}
