use polynet::ParameterRecord;
use serde_json::{json, Value};

pub fn pdms_json() -> Value {
    json!({
        "stoichiometric_imbalance": 1.0,
        "crosslink_conversion": 0.95,
        "crosslink_functionality": 4,
        "functionalize_discrete": true,
        "n_zerofunctional_chains": 10,
        "n_monofunctional_chains": 100,
        "n_bifunctional_chains": 1000,
        "n_beads_zerofunctional": 20,
        "n_beads_monofunctional": 25,
        "n_beads_bifunctional": 50,
        "temperature": "298.15 K",
        "density": "0.965 g/cm^3",
        "bead_mass": "0.162 kg/mol",
        "mean_squared_bead_distance": "0.5 nm^2",
        "plateau_modulus": "0.2 MPa",
        "entanglement_sampling_cutoff": "2.5 nm",
        "polymer_name": "PDMS"
    })
}

pub fn pdms_record() -> ParameterRecord {
    serde_json::from_value(pdms_json()).unwrap()
}
