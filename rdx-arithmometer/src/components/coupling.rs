//! Couples a dependent lever to a master lever.
//!
//! Under [`SyncPolicy::FollowUntilThreshold`] the dependent rides the
//! master's motion from the moment the master is pulled. When the master's
//! angle crosses the agreed threshold the dependent detaches and completes
//! its own stroke independently. Under [`SyncPolicy::ToggleOnHalt`] nothing
//! happens on the pull: each crossing captures a dependent that is not
//! halted and releases one that is.
//!
//! The dependent never reads the master's absolute angle: it only sees the
//! deltas it is fed while synced, and the crossing emissions.

use crate::bus::Condition;
use crate::common::SubscriptionId;
use crate::components::animation::ScalarAnimation;
use crate::components::lever::{Lever, LeverState};
use crate::config::SyncPolicy;
use crate::error::{MachineError, Result};
use crate::events::{AnimationEvent, LeverEvent};
use tracing::debug;

/// A live coupling between two levers. Dropping it leaves the subscriptions
/// in place; call [`LeverCoupling::decouple`] to remove them.
#[derive(Debug)]
pub struct LeverCoupling {
    master: Lever,
    dependent: Lever,
    policy: SyncPolicy,
    threshold_angle: f64,
    attach: Option<SubscriptionId>,
    release: SubscriptionId,
}

impl LeverCoupling {
    /// Couples `dependent` to `master`. `threshold` is the fraction of the
    /// master's travel, measured from rest, at which the dependent detaches.
    pub fn couple(
        master: &Lever,
        dependent: &Lever,
        threshold: f64,
        policy: SyncPolicy,
    ) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(MachineError::InvalidThreshold(threshold));
        }
        let threshold_angle =
            master.min_angle() + threshold * (master.max_angle() - master.min_angle());

        let attach = (policy == SyncPolicy::FollowUntilThreshold).then(|| {
            let source = master.animation().clone();
            let follower = dependent.clone();
            master.subscribe(LeverEvent::PullDown, move |_| {
                if follower.state() == LeverState::Rest
                    && follower.animation().is_idle()
                    && !follower.is_following()
                {
                    debug!(lever = follower.label(), "dependent lever attached");
                    follower.animation().sync(&source)?;
                }
                Ok(())
            })
        });

        let release = {
            let master_animation = master.animation().downgrade();
            let follower = dependent.clone();
            master.animation().subscribe_when(
                AnimationEvent::StatePassed,
                Condition::crossing(threshold_angle),
                move |_| {
                    let Some(source) = master_animation.upgrade() else {
                        return Ok(());
                    };
                    match policy {
                        SyncPolicy::FollowUntilThreshold => {
                            if follower.animation().is_synced_to(&source) {
                                detach(&follower, &source)?;
                            }
                            Ok(())
                        }
                        SyncPolicy::ToggleOnHalt => {
                            if follower.animation().is_halted() {
                                detach(&follower, &source)
                            } else {
                                debug!(lever = follower.label(), "dependent lever captured");
                                follower.animation().sync(&source)
                            }
                        }
                    }
                },
            )
        };

        Ok(Self {
            master: master.clone(),
            dependent: dependent.clone(),
            policy,
            threshold_angle,
            attach,
            release,
        })
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// The master angle at which the dependent is released.
    pub fn threshold_angle(&self) -> f64 {
        self.threshold_angle
    }

    /// Removes both subscriptions and releases the dependent if it is still
    /// riding the master.
    pub fn decouple(self) -> Result<()> {
        if let Some(attach) = self.attach {
            self.master.events().unsubscribe(LeverEvent::PullDown, attach);
        }
        self.master
            .animation()
            .events()
            .unsubscribe(AnimationEvent::StatePassed, self.release);
        if self.dependent.animation().is_synced_to(self.master.animation()) {
            self.dependent.animation().desync(self.master.animation())?;
        }
        Ok(())
    }
}

fn detach(follower: &Lever, source: &ScalarAnimation) -> Result<()> {
    follower.animation().desync(source)?;
    debug!(lever = follower.label(), angle = follower.angle(), "dependent lever released");
    follower.pull_down()?;
    Ok(())
}
