use std::collections::HashMap;

/// Permission levels form a total order: every level permits itself and
/// everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionLevel {
    User = 10,
    Subscriber = 20,
    Moderator = 50,
    Admin = 100,
}

impl PermissionLevel {
    /// Checks whether this level of permission allows actions with specified permission level.
    pub fn permits(&self, other: PermissionLevel) -> bool {
        *self as i32 >= other as i32
    }

    /// Returns highest possible permission level
    pub fn highest() -> PermissionLevel {
        PermissionLevel::Admin
    }

    /// Returns lowest possible permission level
    pub fn lowest() -> PermissionLevel {
        PermissionLevel::User
    }
}

pub struct PermissionList {
    permissions: HashMap<String, PermissionLevel>,
}

impl PermissionList {
    pub fn new(permissions: HashMap<String, PermissionLevel>) -> PermissionList {
        PermissionList { permissions }
    }

    pub fn get(&self, key: &str) -> PermissionLevel {
        *self.permissions.get(key).unwrap_or(&PermissionLevel::lowest())
    }
}
