//! The execution context of one rank: its communicator, plus caches of
//! derived artifacts (motion plans) that are pure functions of immutable
//! inputs. A `Context` is cheap to clone and is held by every layout built
//! on it, so there is no ambient global rank or process count.

use std::collections::HashMap;
use std::fmt;
use log::debug;
use std::sync::{Arc, Mutex, Weak};

use crate::copier::{MotionPlan, PlanKey};
use crate::layout::{Layout, Partition};
use crate::message::comm::{Communicator, SerialCommunicator, TAG_BROADCAST, TAG_REDUCE};
use crate::message::util;

/// Reduction operators supported by level data and the collective
/// `Context::all_reduce_f64`. Each is associative and commutative, so the
/// result does not depend on the order in which values are visited.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    SumAbs,
    Max,
    Min,
    AbsMax,
}

impl Reduction {
    /// The identity element of the reduction.
    pub fn init(&self) -> f64 {
        match self {
            Reduction::Sum | Reduction::SumAbs | Reduction::AbsMax => 0.0,
            Reduction::Max => f64::NEG_INFINITY,
            Reduction::Min => f64::INFINITY,
        }
    }

    /// Fold a raw value into an accumulator.
    pub fn fold(&self, acc: f64, x: f64) -> f64 {
        match self {
            Reduction::Sum => acc + x,
            Reduction::SumAbs => acc + x.abs(),
            Reduction::Max => acc.max(x),
            Reduction::Min => acc.min(x),
            Reduction::AbsMax => acc.max(x.abs()),
        }
    }

    /// Combine two partial results.
    pub fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            Reduction::Sum | Reduction::SumAbs => a + b,
            Reduction::Max | Reduction::AbsMax => a.max(b),
            Reduction::Min => a.min(b),
        }
    }
}

/// A cached plan, with the partitions it was built from. The entry is
/// evicted once any of them has been dropped.
type CachedPlan = (Arc<MotionPlan>, Vec<Weak<Partition>>);

#[derive(Clone)]
pub struct Context {
    comm: Arc<dyn Communicator>,
    plans: Arc<Mutex<HashMap<PlanKey, CachedPlan>>>,
}

impl Context {
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            comm,
            plans: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A context for a single-rank run.
    pub fn serial() -> Self {
        Self::new(Arc::new(SerialCommunicator::new()))
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn send(&self, rank: usize, tag: u32, message: Vec<u8>) {
        self.comm.send(rank, tag, message)
    }

    pub fn recv(&self, rank: usize, tag: u32) -> Vec<u8> {
        self.comm.recv(rank, tag)
    }

    /// Implements a binomial tree broadcast from rank 0. The message buffer
    /// must be `Some` if this is the root, and it must be `None` otherwise.
    ///
    pub fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        let r = self.rank();
        let p = self.size();

        let value = match value {
            Some(value) => {
                assert_eq!(r, 0, "only the root rank may supply the broadcast value");
                value
            }
            None => self.recv(r & (r - 1), TAG_BROADCAST),
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, TAG_BROADCAST, value.clone())
            }
        }
        value
    }

    /// Implements a binomial tree reduce onto rank 0. All ranks return `None`
    /// except for the root. Partial results are combined in a fixed order,
    /// so the outcome is reproducible from run to run.
    ///
    pub fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Option<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one, TAG_REDUCE))
                }
            } else {
                self.send(r - one, TAG_REDUCE, value);
                return None;
            }
        }
        Some(value)
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    pub fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Vec<u8>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        self.broadcast(self.reduce(f, value))
    }

    /// Block until every rank has reached this call.
    pub fn barrier(&self) {
        self.all_reduce(|a, _| a, Vec::new());
    }

    /// All-reduce a scalar under one of the standard reductions.
    pub fn all_reduce_f64(&self, value: f64, op: Reduction) -> f64 {
        let result = self.all_reduce(
            |a, b| op.combine(util::f64_from_bytes(&a), util::f64_from_bytes(&b)).to_le_bytes().to_vec(),
            value.to_le_bytes().to_vec(),
        );
        util::f64_from_bytes(&result)
    }

    /// Return the cached motion plan for `key`, building it on first use.
    /// `layouts` are the layouts the plan is built from. Plans built from a
    /// layout that has since been dropped are pruned whenever a new plan is
    /// inserted.
    pub(crate) fn cached_plan<F>(&self, key: PlanKey, layouts: &[&Layout], build: F) -> Arc<MotionPlan>
    where
        F: FnOnce() -> MotionPlan,
    {
        if let Some((plan, _)) = self.plans.lock().expect("plan cache lock poisoned").get(&key) {
            return plan.clone();
        }
        let plan = Arc::new(build());
        let mut plans = self.plans.lock().expect("plan cache lock poisoned");

        let before = plans.len();
        plans.retain(|_, (_, partitions)| partitions.iter().all(|p| p.strong_count() > 0));
        if plans.len() < before {
            debug!("evicted {} motion plans of dropped layouts", before - plans.len());
        }
        plans.insert(key, (plan.clone(), layouts.iter().map(|l| l.downgrade()).collect()));
        plan
    }

    /// Return the number of motion plans currently cached.
    pub fn num_cached_plans(&self) -> usize {
        self.plans.lock().expect("plan cache lock poisoned").len()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Context(rank {} of {})", self.rank(), self.size())
    }
}
