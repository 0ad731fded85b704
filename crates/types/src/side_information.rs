use serde::{Deserialize, Serialize};

/// Knowledge that breaks the point symmetry of the field, derived outside of the localization
/// (e.g. from the game state and the distance walked since entering the field).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideInformation {
    /// The own half is the half with negative x.
    pub robot_must_be_in_own_half: bool,
}
