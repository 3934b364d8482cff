//! Strongly typed row and column counts to avoid mixing up the two.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rows(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Columns(pub i32);

impl Rows {
    pub const fn count(self) -> i32 {
        self.0
    }
}

impl Columns {
    pub const fn count(self) -> i32 {
        self.0
    }
}

impl std::ops::Mul<Columns> for Rows {
    type Output = usize;

    fn mul(self, cols: Columns) -> usize {
        debug_assert!(self.0 >= 0 && cols.0 >= 0);
        self.0 as usize * cols.0 as usize
    }
}

impl From<i32> for Rows {
    fn from(count: i32) -> Self {
        Rows(count)
    }
}

impl From<i32> for Columns {
    fn from(count: i32) -> Self {
        Columns(count)
    }
}

impl std::fmt::Display for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Columns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
