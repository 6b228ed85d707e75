use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use postrpc::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Operands {
    pub x: i64,
    pub y: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct SleepReq {
    pub millis: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub id: usize,
    pub calls: u64,
}

#[postrpc::procedures]
pub trait Calculator {
    async fn add(&self, req: &Operands) -> Result<i64>;
    async fn sub(&self, req: &Operands) -> Result<i64>;
    async fn mul(&self, req: &Operands) -> Result<i64>;
    async fn div(&self, req: &Operands) -> Result<i64>;
    async fn pow(&self, req: &Operands) -> Result<i64>;
}

#[postrpc::procedures]
pub trait Host {
    /// Sleeps for the requested time, then reports how long it slept.
    async fn sleep(&self, req: &SleepReq) -> Result<u64>;
    async fn whoami(&self, req: &()) -> Result<HostInfo>;
}

/// One host of the demo pool.
#[derive(Debug, Default)]
pub struct DemoHost {
    id: usize,
    calls: AtomicU64,
}

impl DemoHost {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            calls: AtomicU64::default(),
        }
    }

    fn count(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::AcqRel) + 1
    }
}

fn overflow(op: &str, req: &Operands) -> Error {
    Error::new(
        ErrorKind::Unknown("RangeError".into()),
        format!("{op}({}, {}) overflows", req.x, req.y),
    )
}

impl Calculator for DemoHost {
    async fn add(&self, req: &Operands) -> Result<i64> {
        self.count();
        req.x.checked_add(req.y).ok_or_else(|| overflow("add", req))
    }

    async fn sub(&self, req: &Operands) -> Result<i64> {
        self.count();
        req.x.checked_sub(req.y).ok_or_else(|| overflow("sub", req))
    }

    async fn mul(&self, req: &Operands) -> Result<i64> {
        self.count();
        req.x.checked_mul(req.y).ok_or_else(|| overflow("mul", req))
    }

    async fn div(&self, req: &Operands) -> Result<i64> {
        self.count();
        if req.y == 0 {
            return Err(Error::new(
                ErrorKind::Unknown("RangeError".into()),
                "division by zero".into(),
            ));
        }
        req.x.checked_div(req.y).ok_or_else(|| overflow("div", req))
    }

    async fn pow(&self, req: &Operands) -> Result<i64> {
        self.count();
        let exp = u32::try_from(req.y)?;
        req.x.checked_pow(exp).ok_or_else(|| overflow("pow", req))
    }
}

impl Host for DemoHost {
    async fn sleep(&self, req: &SleepReq) -> Result<u64> {
        self.count();
        tokio::time::sleep(Duration::from_millis(req.millis)).await;
        Ok(req.millis)
    }

    async fn whoami(&self, _req: &()) -> Result<HostInfo> {
        Ok(HostInfo {
            id: self.id,
            calls: self.count(),
        })
    }
}
