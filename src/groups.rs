//! Player list groups.
//!
//! Groups live for the whole server lifetime; sessions refer to them by id
//! only, so removing a group never leaves a dangling reference behind.

/// Group id meaning "no group".
pub const NO_GROUP: i16 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i16,
    pub name: String,
    pub rank: u8,
}

impl Group {
    /// Record used for sessions without a group.
    pub fn none() -> Self {
        Self {
            id: NO_GROUP,
            name: String::new(),
            rank: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupRoster {
    groups: Vec<Group>,
}

impl GroupRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a group or update the name and rank of an existing one.
    pub fn add(&mut self, id: i16, name: impl Into<String>, rank: u8) -> &Group {
        let name = name.into();
        let index = match self.groups.iter().position(|g| g.id == id) {
            Some(index) => {
                let group = &mut self.groups[index];
                group.name = name;
                group.rank = rank;
                index
            }
            None => {
                self.groups.push(Group { id, name, rank });
                self.groups.len() - 1
            }
        };
        &self.groups[index]
    }

    pub fn get(&self, id: i16) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Group for `id`, falling back to [`Group::none`].
    pub fn resolve(&self, id: i16) -> Group {
        self.get(id).cloned().unwrap_or_else(Group::none)
    }

    pub fn remove(&mut self, id: i16) -> Option<Group> {
        let index = self.groups.iter().position(|g| g.id == id)?;
        Some(self.groups.remove(index))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_updates_existing_group() {
        let mut roster = GroupRoster::new();
        roster.add(1, "Builders", 10);
        roster.add(1, "Architects", 20);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(1).map(|g| g.rank), Some(20));
    }

    #[test]
    fn missing_group_resolves_to_sentinel() {
        let mut roster = GroupRoster::new();
        roster.add(3, "Guests", 0);
        assert!(roster.remove(3).is_some());
        assert!(roster.remove(3).is_none());
        assert_eq!(roster.resolve(3), Group::none());
    }
}
