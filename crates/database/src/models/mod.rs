mod domain;
mod entry;

pub(crate) use self::domain::DomainObjectRow;
pub(crate) use self::entry::{EntryColumns, EntryRow};
