// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Physics Constructor Catalogue
// ─────────────────────────────────────────────────────────────────────
//! Reference physics lists and the constructors they expand to.
//!
//! A base-model name may carry an electromagnetic suffix (`_EMV`,
//! `_EMZ`, ...) that swaps the standard EM constructor for a variant.

/// Reference lists: name → ordered constructors.
pub const BASE_MODELS: [(&str, &[&str]); 6] = [
    (
        "QGSP_BERT",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4HadronElasticPhysics",
            "G4HadronPhysicsQGSP_BERT",
            "G4StoppingPhysics",
            "G4IonPhysics",
            "G4NeutronTrackingCut",
        ],
    ),
    (
        "QGSP_BIC",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4HadronElasticPhysics",
            "G4HadronPhysicsQGSP_BIC",
            "G4StoppingPhysics",
            "G4IonPhysics",
            "G4NeutronTrackingCut",
        ],
    ),
    (
        "FTFP_BERT",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4HadronElasticPhysics",
            "G4HadronPhysicsFTFP_BERT",
            "G4StoppingPhysics",
            "G4IonPhysics",
            "G4NeutronTrackingCut",
        ],
    ),
    (
        "QBBC",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4HadronElasticPhysicsXS",
            "G4StoppingPhysics",
            "G4IonPhysicsXS",
            "G4HadronInelasticQBBC",
            "G4NeutronTrackingCut",
        ],
    ),
    (
        "Shielding",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4RadioactiveDecayPhysics",
            "G4HadronElasticPhysicsHP",
            "G4HadronPhysicsShielding",
            "G4StoppingPhysics",
            "G4IonQMDPhysics",
        ],
    ),
    (
        "FTFP_INCLXX",
        &[
            "G4EmStandardPhysics",
            "G4EmExtraPhysics",
            "G4DecayPhysics",
            "G4HadronElasticPhysics",
            "G4HadronPhysicsFTFP_BERT",
            "G4HadronPhysicsINCLXX",
            "G4StoppingPhysics",
            "G4IonINCLXXPhysics",
        ],
    ),
];

/// Electromagnetic constructor variants; at most one may be active.
pub const EM_CONSTRUCTORS: [&str; 7] = [
    "G4EmStandardPhysics",
    "G4EmStandardPhysics_option1",
    "G4EmStandardPhysics_option2",
    "G4EmStandardPhysics_option3",
    "G4EmStandardPhysics_option4",
    "G4EmLivermorePhysics",
    "G4EmPenelopePhysics",
];

const EM_SUFFIXES: [(&str, &str); 6] = [
    ("_EMV", "G4EmStandardPhysics_option1"),
    ("_EMX", "G4EmStandardPhysics_option2"),
    ("_EMY", "G4EmStandardPhysics_option3"),
    ("_EMZ", "G4EmStandardPhysics_option4"),
    ("_LIV", "G4EmLivermorePhysics"),
    ("_PEN", "G4EmPenelopePhysics"),
];

/// Constructors that may be appended on top of a reference list.
const EXTRA_CONSTRUCTORS: [&str; 10] = [
    "G4StepLimiterPhysics",
    "G4OpticalPhysics",
    "G4RadioactiveDecayPhysics",
    "G4NeutronTrackingCut",
    "G4DecayPhysics",
    "G4EmExtraPhysics",
    "G4StoppingPhysics",
    "G4IonPhysics",
    "G4FastSimulationPhysics",
    "G4ChargeExchangePhysics",
];

pub fn is_em_constructor(name: &str) -> bool {
    EM_CONSTRUCTORS.contains(&name)
}

/// True if `name` is a constructor the catalogue can resolve.
pub fn is_known_constructor(name: &str) -> bool {
    is_em_constructor(name)
        || EXTRA_CONSTRUCTORS.contains(&name)
        || BASE_MODELS
            .iter()
            .any(|(_, components)| components.contains(&name))
}

/// Expand a base-model name (with optional EM suffix) into its
/// constructors. Returns `None` for an unknown model.
pub fn base_model_components(name: &str) -> Option<Vec<&'static str>> {
    let (base, em) = match EM_SUFFIXES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
    {
        Some((suffix, em)) => (&name[..name.len() - suffix.len()], Some(*em)),
        None => (name, None),
    };
    let (_, components) = BASE_MODELS.iter().find(|(model, _)| *model == base)?;
    let mut list: Vec<&'static str> = components.to_vec();
    if let Some(em) = em {
        for c in list.iter_mut() {
            if is_em_constructor(c) {
                *c = em;
            }
        }
    }
    Some(list)
}
