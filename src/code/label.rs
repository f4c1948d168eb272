use std::fmt;

/// Opaque jump target, scoped to one method body
///
/// A label starts out unbound; `CodeBuilder::place_label` binds it to the current instruction
/// position, exactly once. Branches may reference it before or after binding.
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct Label {
    /// Which body this label belongs to
    pub(crate) code: u32,

    /// Index within that body's label space
    pub(crate) index: u32,
}

/// Generates fresh labels for one body
pub(crate) struct LabelGenerator {
    code: u32,
    next: u32,
}

impl LabelGenerator {
    pub(crate) fn new(code: u32) -> LabelGenerator {
        LabelGenerator { code, next: 0 }
    }

    /// Generate a fresh (unbound) label
    pub(crate) fn fresh_label(&mut self) -> Label {
        let label = Label {
            code: self.code,
            index: self.next,
        };
        self.next += 1;
        label
    }

    /// How many labels have been generated so far
    pub(crate) fn count(&self) -> u32 {
        self.next
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.index))
    }
}
