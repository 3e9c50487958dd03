use sea_query::Iden;

/// Projects table - namespace of hubs and meetings
#[derive(Iden)]
pub enum Projects {
    Table,
    Key,
    Name,
}

/// Hubs table - field device identities
#[derive(Iden)]
pub enum Hubs {
    Table,
    Uuid,
    Name,
    ProjectKey,
}

/// Meetings table - one recording session plus its sync state
#[derive(Iden)]
pub enum Meetings {
    Table,
    Uuid,
    ProjectKey,
    HubUuid,
    StartTimeMs,
    EndTimeMs,
    Location,
    MeetingType,
    Description,
    IsComplete,
    EndingMethod,
    LastUpdateSerial,
    LastUpdateTime,
    FinalChunkIndex,
}

/// Chunks table - discrete indexed log records (v2 protocol)
#[derive(Iden)]
pub enum Chunks {
    Table,
    Id,
    MeetingUuid,
    LogIndex,
    Event,
    LogTimestamp,
    Data,
}
