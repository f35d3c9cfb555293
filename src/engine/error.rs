use thiserror::Error;

use crate::store::StoreError;

/// Facility-facing messages. Callers see these verbatim.
pub mod msg {
    pub const COURT_NOT_FOUND: &str = "Quadra não encontrada.";
    pub const USER_NOT_FOUND: &str = "Usuário não encontrado.";
    pub const RESERVATION_NOT_FOUND: &str = "Reserva não encontrada.";
    pub const TOURNAMENT_NOT_FOUND: &str = "Torneio não encontrado";
    pub const REGISTRATION_NOT_FOUND: &str = "Inscrição não encontrada";

    pub const TOO_SOON: &str = "A reserva deve ser feita com no mínimo 2 horas de antecedência.";
    pub const TOO_FAR: &str = "A reserva não pode ser feita mais de 7 dias antes.";
    pub const OUTSIDE_HOURS: &str =
        "As reservas só podem ser feitas entre 08:00 e 22:00 (horário de Brasília).";
    pub const SLOT_TAKEN: &str = "O horário selecionado já está reservado.";
    pub const TOURNAMENT_DAY: &str = "Esta quadra está reservada para um torneio nesta data.";
    pub const NOT_OWNER_UPDATE_RESERVATION: &str = "Você não tem permissão para alterar esta reserva.";
    pub const NOT_OWNER_DELETE_RESERVATION: &str = "Você não tem permissão para excluir esta reserva.";
    pub const MOVE_OUT_OF_WINDOW: &str = "A nova data está fora do intervalo permitido.";
    pub const MOVE_OUTSIDE_HOURS: &str = "O horário permitido é entre 08:00 e 22:00.";
    pub const MOVE_SLOT_TAKEN: &str = "O horário já está reservado.";
    pub const INVALID_INSTANT: &str = "Data ou horário inválido.";

    pub const DATE_TAKEN: &str = "Já existe um torneio nesta data";
    pub const UNKNOWN_COURTS: &str = "Uma ou mais quadras não foram encontradas";
    pub const INVALID_NAME: &str = "Nome do torneio inválido";
    pub const TOO_MANY_COURTS: &str = "Quantidade de quadras excede o limite";

    pub const TOURNAMENT_INACTIVE: &str = "O torneio não está ativo";
    pub const REGISTRATION_CLOSED: &str = "As inscrições estão fechadas";
    pub const ALREADY_REGISTERED: &str = "Você já está inscrito neste torneio";
    pub const TOURNAMENT_FINISHED: &str = "Este torneio foi finalizado e não aceita mais inscrições";
    pub const INVALID_CATEGORY: &str = "Categoria inválida. Use A, B, C ou D.";
    pub const CATEGORY_NOT_OFFERED: &str = "Categoria não disponível neste torneio";
    pub const PARTNER_NOT_FOUND: &str = "Parceiro não encontrado com o email fornecido";
    pub const NOT_OWNER_UPDATE_REGISTRATION: &str =
        "Você não tem permissão para atualizar esta inscrição";
    pub const NOT_OWNER_CANCEL_REGISTRATION: &str =
        "Você não tem permissão para cancelar esta inscrição";
    pub const CANCEL_AFTER_EVENT: &str =
        "Não é possível cancelar a inscrição após o torneio ter ocorrido";

    pub const EMAIL_TAKEN: &str = "Email already registered";
}

/// The kinds of failure callers map to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Conflict,
    Unauthorized,
    /// Persistence failure; opaque to the caller.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub fn not_found(message: &str) -> Self {
        EngineError::NotFound(message.to_string())
    }

    pub fn bad_request(message: &str) -> Self {
        EngineError::BadRequest(message.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::BadRequest(_) => ErrorKind::BadRequest,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Constraint violations caught on write read exactly like the matching pre-check.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(entity) => EngineError::not_found(match entity {
                "court" => msg::COURT_NOT_FOUND,
                "user" => msg::USER_NOT_FOUND,
                "reservation" => msg::RESERVATION_NOT_FOUND,
                "tournament" => msg::TOURNAMENT_NOT_FOUND,
                "registration" => msg::REGISTRATION_NOT_FOUND,
                _ => return EngineError::NotFound(format!("{entity} not found")),
            }),
            StoreError::UnknownCourt(_) => EngineError::bad_request(msg::UNKNOWN_COURTS),
            StoreError::SlotTaken { .. } => EngineError::bad_request(msg::SLOT_TAKEN),
            StoreError::DateTaken(_) => EngineError::bad_request(msg::DATE_TAKEN),
            StoreError::AlreadyRegistered => EngineError::bad_request(msg::ALREADY_REGISTERED),
            StoreError::TournamentFinished => EngineError::bad_request(msg::TOURNAMENT_FINISHED),
            StoreError::Capacity(c) => EngineError::bad_request(c.message()),
            StoreError::Pairing(p) => EngineError::bad_request(p.message()),
            StoreError::EmailTaken(_) => EngineError::Conflict(msg::EMAIL_TAKEN.to_string()),
            e @ StoreError::Journal(_) => EngineError::Store(e),
        }
    }
}
