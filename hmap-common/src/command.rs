//! # Command Definitions
//!
//! Purpose: Name the store operations the mapper can describe, and the
//! per-call qualifiers passed through to the store untouched.

use std::fmt;

/// Kind of store command an operation descriptor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Read one hash field.
    Get,
    /// Read several hash fields.
    MGet,
    /// Write one hash field.
    Set,
    /// Write several hash fields.
    MSet,
    /// Remove one hash field.
    DelField,
    /// Remove a whole key.
    DelKey,
    /// Increment a plain counter key.
    Incr,
    /// Increment a hash field.
    HIncr,
    /// Attach a time-to-live to a key.
    Expire,
    /// Check whether a key exists.
    Exists,
}

impl CommandKind {
    /// Redis-compatible verb used in diagnostics.
    pub const fn verb(&self) -> &'static str {
        match self {
            CommandKind::Get => "HGET",
            CommandKind::MGet => "HMGET",
            CommandKind::Set => "HSET",
            CommandKind::MSet => "HMSET",
            CommandKind::DelField => "HDEL",
            CommandKind::DelKey => "DEL",
            CommandKind::Incr => "INCRBY",
            CommandKind::HIncr => "HINCRBY",
            CommandKind::Expire => "EXPIRE",
            CommandKind::Exists => "EXISTS",
        }
    }

    /// Returns true for commands that only read.
    pub const fn is_read(&self) -> bool {
        matches!(
            self,
            CommandKind::Get | CommandKind::MGet | CommandKind::Exists
        )
    }

    /// Returns true for commands that address the key rather than fields.
    pub const fn is_key_level(&self) -> bool {
        matches!(
            self,
            CommandKind::DelKey | CommandKind::Incr | CommandKind::Expire | CommandKind::Exists
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Opaque per-call flag forwarded to the store unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandFlags {
    /// Wait for the server acknowledgement and return its reply.
    #[default]
    None,
    /// Send without waiting; the call resolves to the reply type's default.
    FireAndForget,
}

impl CommandFlags {
    /// Maps the common boolean switch onto a flag.
    pub const fn from_fire_and_forget(fire_and_forget: bool) -> Self {
        if fire_and_forget {
            CommandFlags::FireAndForget
        } else {
            CommandFlags::None
        }
    }

    #[inline]
    pub const fn is_fire_and_forget(&self) -> bool {
        matches!(self, CommandFlags::FireAndForget)
    }
}

/// Qualifier for single-field writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetCondition {
    /// Always write the field.
    #[default]
    Always,
    /// Write only when the field does not exist yet.
    IfMissing,
    /// Write only when the field already exists.
    IfPresent,
}
