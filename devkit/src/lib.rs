/*!
# Dispatch DevKit - Doubles de test pour la vue live

Bibliothèque facilitant les tests du tracker avec:
- Carte enregistreuse (journal des appels + injection de pannes)
- Source d'urgences scriptée (réponses en file, latence simulée)
- Builder d'enregistrements d'urgence
- Harness complet vue + carte + source
*/

pub mod map_stub;
pub mod source_stub;
pub mod test_utils;

pub use map_stub::{MapCall, MapOp, RecordingMap};
pub use source_stub::{IncidentBuilder, ScriptedSource};
pub use test_utils::TestHarness;
