use crate::model::{Gender, Registration, Tournament};

/// Why a registration would break partner exclusivity inside one tournament.
///
/// Every person takes part at most once per tournament, either as the
/// registrant or as someone's named partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingConflict {
    /// Another registration already names the registrant as its partner.
    RegistrantAlreadyPartnered,
    PartnerIsSelf,
    /// The named partner holds their own registration.
    PartnerAlreadyRegistered,
    /// Another registration already names the same partner.
    PartnerAlreadyClaimed,
}

impl PairingConflict {
    pub fn message(&self) -> &'static str {
        match self {
            PairingConflict::RegistrantAlreadyPartnered => {
                "Este parceiro já está inscrito com outro jogador"
            }
            PairingConflict::PartnerIsSelf => "Você não pode ser seu próprio parceiro",
            PairingConflict::PartnerAlreadyRegistered => {
                "O parceiro informado já está inscrito neste torneio"
            }
            PairingConflict::PartnerAlreadyClaimed => {
                "O parceiro informado já foi escolhido por outro jogador"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityConflict {
    Gender(Gender),
    Overall,
}

impl CapacityConflict {
    pub fn message(&self) -> &'static str {
        match self {
            CapacityConflict::Gender(Gender::Male) => "O limite de inscrições masculinas foi atingido",
            CapacityConflict::Gender(Gender::Female) => "O limite de inscrições femininas foi atingido",
            CapacityConflict::Overall => "O limite de participantes do torneio foi atingido",
        }
    }
}

/// Check a prospective registration against the others of the same tournament.
///
/// `others` must not contain the registration being checked.
pub fn pairing_conflict<'a>(
    others: impl IntoIterator<Item = &'a Registration>,
    registrant_email: &str,
    partner_email: Option<&str>,
) -> Option<PairingConflict> {
    let others: Vec<&Registration> = others.into_iter().collect();
    let names = |reg: &Registration, email: &str| {
        reg.partner_email
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(email))
    };

    if others.iter().any(|r| names(r, registrant_email)) {
        return Some(PairingConflict::RegistrantAlreadyPartnered);
    }
    let partner = partner_email?;
    if partner.eq_ignore_ascii_case(registrant_email) {
        return Some(PairingConflict::PartnerIsSelf);
    }
    if others.iter().any(|r| r.user_email.eq_ignore_ascii_case(partner)) {
        return Some(PairingConflict::PartnerAlreadyRegistered);
    }
    if others.iter().any(|r| names(r, partner)) {
        return Some(PairingConflict::PartnerAlreadyClaimed);
    }
    None
}

/// Would one more registrant of `gender` exceed the tournament's caps?
pub fn capacity_conflict<'a>(
    tournament: &Tournament,
    existing: impl IntoIterator<Item = &'a Registration>,
    gender: Gender,
) -> Option<CapacityConflict> {
    let (mut total, mut same_gender) = (0u32, 0u32);
    for reg in existing {
        total += 1;
        if reg.gender == gender {
            same_gender += 1;
        }
    }
    if let Some(caps) = tournament.max_participants_by_gender
        && same_gender >= caps.cap_for(gender)
    {
        return Some(CapacityConflict::Gender(gender));
    }
    if let Some(max) = tournament.max_participants
        && total >= max
    {
        return Some(CapacityConflict::Overall);
    }
    None
}
