use std::fmt::{Display, Error, Formatter};
use std::ops::Sub;

/// Elements with a width in JVM words
///
/// Both the operand stack and the local variables count `long` and `double` values as two words
/// while everything else takes up one word. Instructions like `pop2` or `dup2_x1` and the layout
/// of locals depend on this.
pub trait Width {
    fn width(&self) -> usize;
}

/// Byte offset of an instruction inside of a method's `code` array
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Offset(pub usize);

impl Offset {
    /// Offset reached by jumping `delta` bytes from this one
    ///
    /// Returns `None` if the jump would land before the start of the code.
    pub fn jump(self, delta: i32) -> Option<Offset> {
        let target = self.0 as i64 + delta as i64;
        if target < 0 {
            None
        } else {
            Some(Offset(target as usize))
        }
    }
}

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn jumps() {
        assert_eq!(Offset(10).jump(-4), Some(Offset(6)));
        assert_eq!(Offset(10).jump(5), Some(Offset(15)));
        assert_eq!(Offset(3).jump(-4), None);
        assert_eq!(Offset(7) - Offset(10), -3);
    }
}
