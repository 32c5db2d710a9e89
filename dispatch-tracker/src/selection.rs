/**
 * SELECTION - Réconciliation de la sélection opérateur entre deux snapshots
 *
 * RÈGLES :
 * 1. snapshot vide -> aucune sélection
 * 2. sélection vide ou disparue -> premier record du snapshot
 * 3. sinon la sélection reste inchangée (jamais de vol de focus par le polling)
 *
 * La disparition d'une urgence n'a pas d'événement dédié : elle est déduite
 * par différence d'ensembles (ids précédents - ids nouveaux), voir SnapshotDiff.
 */

use crate::models::Snapshot;
use serde::Serialize;

/// Calcule la prochaine sélection à partir de la précédente et du nouveau snapshot
pub fn reconcile(previous: Option<&str>, snapshot: &Snapshot) -> Option<String> {
    let first = snapshot.first()?;
    match previous {
        Some(id) if snapshot.contains(id) => Some(id.to_string()),
        _ => Some(first.id.clone()),
    }
}

/// Différence entre deux snapshots, par identité (`id`) uniquement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// Apparues dans le nouveau snapshot, ordre serveur
    pub added: Vec<String>,
    /// Absentes du nouveau snapshot : considérées résolues ou annulées
    pub resolved: Vec<String>,
    pub retained: Vec<String>,
}

impl SnapshotDiff {
    pub fn between(previous: &Snapshot, next: &Snapshot) -> Self {
        let prev_ids = previous.ids();
        let next_ids = next.ids();

        let mut diff = SnapshotDiff::default();
        for record in next.records() {
            if prev_ids.contains(record.id.as_str()) {
                diff.retained.push(record.id.clone());
            } else {
                diff.added.push(record.id.clone());
            }
        }
        diff.resolved = previous
            .records()
            .iter()
            .filter(|r| !next_ids.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect();
        diff
    }

    pub fn was_resolved(&self, id: &str) -> bool {
        self.resolved.iter().any(|r| r == id)
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.resolved.is_empty()
    }
}
