use crate::assembly::Label;

/// Mints `.L<n>` labels. One generator lives for one compilation, so the same
/// source always gets the same labels.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    current: usize,
}

impl LabelGenerator {
    pub const fn new() -> Self {
        Self { current: 0 }
    }
    pub fn new_label(&mut self) -> Label {
        let current = self.current;
        self.current += 1;
        Label::new(format!(".L{}", current))
    }
}
