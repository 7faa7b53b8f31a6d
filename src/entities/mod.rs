// Entity Models
//
// Each entity has:
// - Store-assigned integer identity that never changes
// - A creation payload (New*) carrying only what the caller supplies
//
// Users exist on their own; a Group owns an ordered list of Members,
// and Rounds point at a group and the user who paid.

pub mod user;
pub mod group;
pub mod round;

pub use user::{NewUser, User};
pub use group::{Group, Member, NewGroup};
pub use round::{NewRound, Round};
