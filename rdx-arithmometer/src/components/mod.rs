//! Contains the moving parts the machine is assembled from.
//!
//! Every part is built on a [`ScalarAnimation`](animation::ScalarAnimation):
//! digit wheels (grouped into registers), pull levers, and the crank of the
//! operation handle. The `ArithmometerEngine` owns one of each and wires
//! their events together.

pub mod animation;
pub mod coupling;
pub mod crank;
pub mod lever;
pub mod wheel;
