//! Lead storage

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use leadflow_core::{
    Lead, LeadActivity, LeadId, LeadNote, LeadRepository, LeadStatus, NewLead, StoreError,
};

#[derive(Default)]
struct Inner {
    next_id: LeadId,
    leads: BTreeMap<LeadId, Lead>,
    by_phone: HashMap<String, LeadId>,
    notes: HashMap<LeadId, Vec<LeadNote>>,
    activity: HashMap<LeadId, Vec<LeadActivity>>,
}

/// Leads keyed by id with a unique phone index
#[derive(Default)]
pub struct InMemoryLeadRepository {
    inner: RwLock<Inner>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored leads
    pub fn len(&self) -> usize {
        self.inner.read().leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every lead, ordered by id
    pub fn all(&self) -> Vec<Lead> {
        self.inner.read().leads.values().cloned().collect()
    }
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn create(&self, lead: NewLead) -> Result<Lead, StoreError> {
        let mut inner = self.inner.write();

        if inner.by_phone.contains_key(&lead.phone) {
            return Err(StoreError::Duplicate {
                entity: "lead",
                key: lead.phone,
            });
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let record = Lead {
            id,
            phone: lead.phone,
            name: lead.name,
            source: lead.source,
            status: LeadStatus::Nuevo,
            answers: lead.answers,
            created_at: lead.created_at,
            updated_at: lead.created_at,
            last_advisor_action_at: None,
        };

        inner.by_phone.insert(record.phone.clone(), id);
        inner.leads.insert(id, record.clone());

        tracing::debug!(lead_id = id, phone = %record.phone, "Lead stored");
        Ok(record)
    }

    async fn get(&self, id: LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.inner.read().leads.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_phone
            .get(phone)
            .and_then(|id| inner.leads.get(id))
            .cloned())
    }

    async fn update(&self, lead: &Lead) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        match inner.leads.get_mut(&lead.id) {
            Some(existing) => {
                *existing = lead.clone();
                Ok(())
            },
            None => Err(StoreError::NotFound {
                entity: "lead",
                key: lead.id.to_string(),
            }),
        }
    }

    async fn list_open(&self) -> Result<Vec<Lead>, StoreError> {
        Ok(self
            .inner
            .read()
            .leads
            .values()
            .filter(|l| !l.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn add_note(&self, note: LeadNote) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.leads.contains_key(&note.lead_id) {
            return Err(StoreError::NotFound {
                entity: "lead",
                key: note.lead_id.to_string(),
            });
        }
        inner.notes.entry(note.lead_id).or_default().push(note);
        Ok(())
    }

    async fn notes(&self, id: LeadId) -> Result<Vec<LeadNote>, StoreError> {
        Ok(self.inner.read().notes.get(&id).cloned().unwrap_or_default())
    }

    async fn record_activity(&self, activity: LeadActivity) -> Result<(), StoreError> {
        self.inner
            .write()
            .activity
            .entry(activity.lead_id)
            .or_default()
            .push(activity);
        Ok(())
    }

    async fn activity(&self, id: LeadId) -> Result<Vec<LeadActivity>, StoreError> {
        Ok(self
            .inner
            .read()
            .activity
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadflow_core::ActivityKind;

    fn new_lead(phone: &str) -> NewLead {
        NewLead {
            phone: phone.to_string(),
            name: "Carla".to_string(),
            source: "whatsapp".to_string(),
            answers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let repo = InMemoryLeadRepository::new();
        let a = repo.create(new_lead("5215500000001")).await.unwrap();
        let b = repo.create(new_lead("5215500000002")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.status, LeadStatus::Nuevo);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected() {
        let repo = InMemoryLeadRepository::new();
        repo.create(new_lead("5215500000001")).await.unwrap();
        let err = repo.create(new_lead("5215500000001")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "lead", .. }));
    }

    #[tokio::test]
    async fn test_update_and_list_open() {
        let repo = InMemoryLeadRepository::new();
        let mut lead = repo.create(new_lead("5215500000001")).await.unwrap();
        repo.create(new_lead("5215500000002")).await.unwrap();

        lead.status = LeadStatus::Perdido;
        repo.update(&lead).await.unwrap();

        let open = repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].phone, "5215500000002");

        let found = repo.find_by_phone("5215500000001").await.unwrap().unwrap();
        assert_eq!(found.status, LeadStatus::Perdido);
    }

    #[tokio::test]
    async fn test_update_missing_lead() {
        let repo = InMemoryLeadRepository::new();
        let mut lead = repo.create(new_lead("5215500000001")).await.unwrap();
        lead.id = 99;
        assert!(matches!(
            repo.update(&lead).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_notes_and_activity() {
        let repo = InMemoryLeadRepository::new();
        let lead = repo.create(new_lead("5215500000001")).await.unwrap();

        repo.add_note(LeadNote::new(lead.id, Some(3), "Busca casa en Coyoacán", Utc::now()))
            .await
            .unwrap();
        repo.record_activity(LeadActivity {
            lead_id: lead.id,
            kind: ActivityKind::ContactAttempt,
            advisor_id: Some(3),
            at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(repo.notes(lead.id).await.unwrap().len(), 1);
        assert_eq!(
            repo.activity(lead.id).await.unwrap()[0].kind,
            ActivityKind::ContactAttempt
        );

        let orphan = LeadNote::new(42, None, "x", Utc::now());
        assert!(repo.add_note(orphan).await.is_err());
    }
}
