/// Row ids touched by [`crate::Db::apply_transition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedTransition {
    pub revived: bool,
    pub seeded: Option<i64>,
    pub resized: Option<i64>,
    pub restated: Option<i64>,
    pub closed: Option<i64>,
    pub opened: Option<i64>,
}

impl AppliedTransition {
    pub fn created_interval(&self) -> bool {
        self.seeded.is_some() || self.opened.is_some()
    }
}
