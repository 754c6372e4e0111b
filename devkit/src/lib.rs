/*!
# Airnalyzer DevKit - Stubs et utilitaires pour le bridge

Bibliothèque facilitant les tests du bridge sans carte branchée :
- Backend série scripté (ports visibles, échecs d'ouverture, lignes émises)
- Construction de lignes capteurs JSON
- Harness de test complet (contexte, ingestion, abonnements)
*/

pub mod line_helpers;
pub mod serial_stub;
pub mod test_utils;

pub use line_helpers::SensorLineBuilder;
pub use serial_stub::{DeviceScript, MockSerialBackend};
pub use test_utils::TestHarness;
