//! Identity resolution: one Person per document, created on first sight and
//! merged non-destructively afterwards.

use accredia_core::{DocumentKey, PersonId, UserId};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::store::{
    AccreditationStore, InsertedPerson, NewPerson, PersonRecord, PersonUpdate, StoreError,
};
use crate::validation::non_blank;

/// Attributes a candidate brings for its Person.
#[derive(Debug, Clone, Default)]
pub struct IdentityAttributes {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_title: Option<String>,
    pub organization: Option<String>,
    pub media_type: Option<String>,
}

/// One candidate to resolve.
#[derive(Debug, Clone)]
pub struct IdentityRequest {
    pub key: DocumentKey,
    pub attributes: IdentityAttributes,
}

/// Resolved identities of a batch.
#[derive(Debug, Clone, Default)]
pub struct ResolvedIdentities {
    pub persons: HashMap<DocumentKey, PersonId>,
    /// Persons created by this resolution, in creation order.
    pub created: Vec<PersonId>,
}

impl ResolvedIdentities {
    #[must_use]
    pub fn person_for(&self, key: &DocumentKey) -> Option<PersonId> {
        self.persons.get(key).copied()
    }
}

/// Resolution aborted. `created` lists Persons already created before the
/// failure so that they can be compensated.
#[derive(Debug, Error)]
#[error("identity resolution failed in chunk {chunk_index}: {source}")]
pub struct IdentityError {
    #[source]
    pub source: StoreError,
    pub chunk_index: usize,
    pub created: Vec<PersonId>,
}

pub struct IdentityResolver {
    store: Arc<dyn AccreditationStore>,
    chunk_size: usize,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn AccreditationStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Resolve or create a Person for every request.
    ///
    /// Requests are processed in chunks: one batched lookup, concurrent merges
    /// for matched Persons, one batched insert for the rest. Requests sharing
    /// a document resolve to the same Person, using the first request's
    /// attributes.
    ///
    /// `link_account` asks for the Person of the first request to be linked to
    /// an authenticated account. An account is never linked to two Persons: if
    /// it already belongs to another Person, the link is skipped and logged.
    pub async fn resolve_or_create(
        &self,
        requests: &[IdentityRequest],
        link_account: Option<UserId>,
    ) -> Result<ResolvedIdentities, IdentityError> {
        let mut resolved = ResolvedIdentities::default();

        let mut link = match link_account {
            Some(user_id) => {
                let linked = self
                    .store
                    .person_linked_to_account(user_id)
                    .await
                    .map_err(|source| IdentityError {
                        source,
                        chunk_index: 0,
                        created: Vec::new(),
                    })?;
                requests.first().map(|first| AccountLink {
                    user_id,
                    key: first.key.clone(),
                    linked_person: linked,
                })
            }
            None => None,
        };

        let mut seen: HashSet<&DocumentKey> = HashSet::new();
        let pending: Vec<&IdentityRequest> = requests
            .iter()
            .filter(|r| seen.insert(&r.key))
            .collect();

        for (chunk_index, chunk) in pending.chunks(self.chunk_size).enumerate() {
            self.resolve_chunk(chunk, &mut link, &mut resolved)
                .await
                .map_err(|source| {
                    tracing::error!(
                        chunk_index,
                        chunk_size = chunk.len(),
                        created = resolved.created.len(),
                        error = %source,
                        "Identity resolution failed"
                    );
                    IdentityError {
                        source,
                        chunk_index,
                        created: resolved.created.clone(),
                    }
                })?;
            tracing::debug!(chunk_index, chunk_size = chunk.len(), "Identity chunk resolved");
        }

        Ok(resolved)
    }

    async fn resolve_chunk(
        &self,
        chunk: &[&IdentityRequest],
        link: &mut Option<AccountLink>,
        resolved: &mut ResolvedIdentities,
    ) -> Result<(), StoreError> {
        let keys: Vec<DocumentKey> = chunk.iter().map(|r| r.key.clone()).collect();
        let existing: HashMap<DocumentKey, PersonRecord> = self
            .store
            .find_persons_by_documents(&keys)
            .await?
            .into_iter()
            .map(|p| (p.key.clone(), p))
            .collect();

        let mut updates: Vec<(PersonId, PersonUpdate)> = Vec::new();
        let mut to_create: Vec<NewPerson> = Vec::new();

        for request in chunk {
            match existing.get(&request.key) {
                Some(person) => {
                    resolved.persons.insert(request.key.clone(), person.id);
                    let mut update = person_update(person, request);
                    if let Some(user_id) = take_link_for(link, &request.key, Some(person)) {
                        update.user_id = Some(user_id);
                    }
                    if !update.is_empty() {
                        updates.push((person.id, update));
                    }
                }
                None => {
                    let user_id = take_link_for(link, &request.key, None);
                    to_create.push(new_person(request, user_id));
                }
            }
        }

        if !to_create.is_empty() {
            let by_key: HashMap<&DocumentKey, &IdentityRequest> =
                chunk.iter().map(|r| (&r.key, *r)).collect();
            for inserted in self.insert_linking(&mut to_create).await? {
                let person = inserted.person;
                resolved.persons.insert(person.key.clone(), person.id);
                if inserted.created {
                    resolved.created.push(person.id);
                } else if let Some(request) = by_key.get(&person.key) {
                    // Lost a race with a concurrent creator: merge instead.
                    let update = person_update(&person, request);
                    if !update.is_empty() {
                        updates.push((person.id, update));
                    }
                }
            }
        }

        try_join_all(
            updates
                .iter()
                .map(|(id, update)| self.update_linking(*id, update)),
        )
        .await?;

        Ok(())
    }

    /// Insert, dropping the account link if a concurrent request linked the
    /// account first. The failed insert wrote nothing.
    async fn insert_linking(
        &self,
        to_create: &mut [NewPerson],
    ) -> Result<Vec<InsertedPerson>, StoreError> {
        match self.store.insert_persons(to_create).await {
            Err(StoreError::AccountAlreadyLinked(user_id)) => {
                tracing::warn!(
                    user_id = %user_id,
                    "Account linked concurrently to another person, not linking"
                );
                for person in to_create.iter_mut() {
                    person.user_id = None;
                }
                self.store.insert_persons(to_create).await
            }
            other => other,
        }
    }

    async fn update_linking(&self, id: PersonId, update: &PersonUpdate) -> Result<(), StoreError> {
        match self.store.update_person(id, update).await {
            Err(StoreError::AccountAlreadyLinked(user_id)) => {
                tracing::warn!(
                    user_id = %user_id,
                    person_id = %id,
                    "Account linked concurrently to another person, not linking"
                );
                let unlinked = PersonUpdate {
                    user_id: None,
                    ..update.clone()
                };
                self.store.update_person(id, &unlinked).await
            }
            other => other,
        }
    }
}

struct AccountLink {
    user_id: UserId,
    key: DocumentKey,
    linked_person: Option<PersonId>,
}

/// The account to link to the Person resolved for `key`, if the link applies
/// and would not attach the account to a second Person.
fn take_link_for(
    link: &mut Option<AccountLink>,
    key: &DocumentKey,
    existing: Option<&PersonRecord>,
) -> Option<UserId> {
    if link.as_ref().map_or(true, |l| &l.key != key) {
        return None;
    }
    let link = link.take()?;

    match (link.linked_person, existing) {
        (Some(linked), Some(person)) if linked == person.id => None,
        (Some(linked), _) => {
            tracing::warn!(
                user_id = %link.user_id,
                linked_person = %linked,
                document = %key,
                "Account already linked to another person, not linking"
            );
            None
        }
        (None, Some(person)) if person.user_id.is_some() => {
            tracing::warn!(
                user_id = %link.user_id,
                person_id = %person.id,
                "Person already linked to another account, not linking"
            );
            None
        }
        (None, _) => Some(link.user_id),
    }
}

fn new_person(request: &IdentityRequest, user_id: Option<UserId>) -> NewPerson {
    let a = &request.attributes;
    NewPerson {
        key: request.key.clone(),
        first_name: clean(a.first_name.as_deref()),
        last_name: clean(a.last_name.as_deref()),
        email: clean(a.email.as_deref()),
        phone: clean(a.phone.as_deref()),
        role_title: clean(a.role_title.as_deref()),
        organization: clean(a.organization.as_deref()),
        media_type: clean(a.media_type.as_deref()),
        nationality: Some(request.key.document_type.implied_nationality()),
        user_id,
    }
}

/// Non-empty incoming values that differ from what is stored.
fn person_update(person: &PersonRecord, request: &IdentityRequest) -> PersonUpdate {
    let a = &request.attributes;
    let nationality = request.key.document_type.implied_nationality();
    PersonUpdate {
        first_name: changed(person.first_name.as_deref(), a.first_name.as_deref()),
        last_name: changed(person.last_name.as_deref(), a.last_name.as_deref()),
        email: changed(person.email.as_deref(), a.email.as_deref()),
        phone: changed(person.phone.as_deref(), a.phone.as_deref()),
        role_title: changed(person.role_title.as_deref(), a.role_title.as_deref()),
        organization: changed(person.organization.as_deref(), a.organization.as_deref()),
        media_type: changed(person.media_type.as_deref(), a.media_type.as_deref()),
        nationality: (person.nationality != Some(nationality)).then_some(nationality),
        user_id: None,
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

fn changed(stored: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let incoming = non_blank(incoming)?;
    (stored != Some(incoming)).then(|| incoming.to_string())
}
