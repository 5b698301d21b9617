// Business domains
pub mod campaigns;
