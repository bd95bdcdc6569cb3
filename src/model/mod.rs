pub mod autofluorescence;
pub mod bleedthrough;
pub mod estimators;
pub mod experiment;
pub mod gates;
pub mod gmm;
pub mod population;
