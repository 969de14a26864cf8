use crate::trajectory::WindowParams;

/// Joint columns captured per arm: six actuated joints plus the gripper.
/// The capture rig records both arms side by side, so a `qpos`/`action`
/// row is `2 * ARM_COLUMNS` wide; confirm the ordering against the target
/// hardware before pointing this at a different rig.
pub const ARM_COLUMNS: usize = 7;

/// Which arm's column block an episode's vectors are read from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArmSide {
    Left,
    Right,
}

impl ArmSide {
    /// Offset of this arm's block within a full joint vector.
    pub fn column_offset(self) -> usize {
        match self {
            ArmSide::Left => 0,
            ArmSide::Right => ARM_COLUMNS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArmSide::Left => "left",
            ArmSide::Right => "right",
        }
    }
}

/// Closed set of capture origins.
///
/// Each variant carries its own trajectory sampling parameters and the
/// label value stored with every demo; downstream filtering relies on the
/// label, the window generator on the sampling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceKind {
    /// Human hand demonstrations (higher capture rate relative to motion).
    Hand,
    /// Robot teleoperation rollouts.
    Robot,
}

impl SourceKind {
    pub fn sampling(self) -> WindowParams {
        match self {
            SourceKind::Hand => WindowParams {
                point_gap: 4,
                future_points: 10,
            },
            SourceKind::Robot => WindowParams {
                point_gap: 15,
                future_points: 10,
            },
        }
    }

    /// Stored label: hand = 1, robot = 0.
    pub fn label(self) -> i64 {
        match self {
            SourceKind::Hand => 1,
            SourceKind::Robot => 0,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Hand => "hand",
            SourceKind::Robot => "robot",
        }
    }
}
