/// Classic networks (Michaelis-Menten, Schlögl, cooperative switch, ACR motif) and
/// the runnable demonstrations built on them.
pub mod crn_examples;
