/// A reusable email body that may belong to several newsletters.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub subject: String,
    pub body: String,
}
