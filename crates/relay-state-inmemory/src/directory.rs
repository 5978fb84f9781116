use async_trait::async_trait;
use dashmap::DashMap;

use relay_core::{CoreError, IdentityDirectory, OrgChart, Person, PersonId};

/// In-memory people directory, serving identity checks and org chart queries
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    people: DashMap<PersonId, Person>,
}

impl InMemoryDirectory {
    /// Create a directory holding the given people
    pub fn new(people: impl IntoIterator<Item = Person>) -> Self {
        let directory = Self::default();
        for person in people {
            directory.upsert(person);
        }
        directory
    }

    /// Add or replace a person
    pub fn upsert(&self, person: Person) {
        self.people.insert(person.id, person);
    }

    /// Number of people known
    pub fn len(&self) -> usize {
        self.people.len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    fn lookup(&self, person_id: PersonId) -> Result<Person, CoreError> {
        self.people
            .get(&person_id)
            .map(|p| p.clone())
            .ok_or(CoreError::UnknownPerson(person_id))
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn exists(&self, person_id: PersonId) -> Result<bool, CoreError> {
        Ok(self.people.contains_key(&person_id))
    }
}

#[async_trait]
impl OrgChart for InMemoryDirectory {
    async fn children(&self, person_id: PersonId) -> Result<Vec<Person>, CoreError> {
        self.lookup(person_id)?;
        let mut children: Vec<Person> = self
            .people
            .iter()
            .filter(|p| p.manager_id == Some(person_id))
            .map(|p| p.value().clone())
            .collect();
        children.sort_by_key(|p| p.id);
        Ok(children)
    }

    async fn parent(&self, person_id: PersonId) -> Result<Option<Person>, CoreError> {
        let person = self.lookup(person_id)?;
        match person.manager_id {
            Some(manager_id) => Ok(self.people.get(&manager_id).map(|p| p.clone())),
            None => Ok(None),
        }
    }
}
