// MongoDB-backed implementations of the platform contracts. The hosted
// deployment (Atlas) plays the identity service, the document store and the
// blob store; session tokens are JWTs minted on sign-in.
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, oid::ObjectId, Binary, DateTime as BsonDateTime, Document};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{BlobReceipt, Identity, IdentityProfileFields, ProfileDocument, ProfileFieldPatch};
use crate::remote::{
    google, BlobStore, DocumentCallback, FederatedAuthUrl, IdentityService, ProfileStore,
    SessionCallback, Subscription,
};
use crate::utils::{AppError, AppResult};

const ACCOUNTS_COLLECTION: &str = "accounts";
const BLOBS_COLLECTION: &str = "blobs";

/// Connection to the hosted MongoDB deployment.
#[derive(Clone)]
pub struct MongoPlatform {
    client: Client,
    db: Database,
}

impl MongoPlatform {
    pub async fn new(uri: &str) -> AppResult<Self> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Invalid connection string: {}", e)))?;

        client_options.max_pool_size = Some(10);
        client_options.min_pool_size = Some(2);
        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)
            .map_err(|e| AppError::DatabaseError(format!("Failed to build client: {}", e)))?;

        let db_name = uri
            .split('/')
            .last()
            .and_then(|s| s.split('?').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("ProfileSync");
        let db = client.database(db_name);

        // Test connection
        db.list_collection_names()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Connection test failed: {}", e)))?;

        let platform = Self { client, db };
        platform.ensure_indexes().await?;
        Ok(platform)
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        use mongodb::IndexModel;

        log::info!("🔧 Creating database indexes...");
        let accounts = self.db.collection::<Document>(ACCOUNTS_COLLECTION);

        for keys in [doc! { "email": 1 }, doc! { "user_id": 1 }] {
            let index = IndexModel::builder().keys(keys.clone()).build();
            match accounts.create_index(index).await {
                Ok(_) => log::info!("   ✅ Index created: accounts({})", keys),
                Err(e) => log::debug!("   ℹ️  Index already exists: {}", e),
            }
        }

        log::info!("✅ Database indexes ready");
        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
// Session token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // identity id
    pub email: String,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "default-secret-change-me".to_string())
}

fn jwt_issuer() -> String {
    std::env::var("JWT_ISSUER").unwrap_or_else(|_| "profile-sync-service".to_string())
}

fn jwt_audience() -> String {
    std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "profile-sync-client".to_string())
}

/// Mints the platform session token handed out with a fresh sign-in.
pub fn generate_id_token(identity_id: &str, email: &str) -> AppResult<String> {
    let iat = Utc::now().timestamp() as usize;
    let exp = (Utc::now() + Duration::hours(24)).timestamp() as usize;

    let claims = Claims {
        sub: identity_id.to_string(),
        email: email.to_string(),
        iat,
        exp,
        jti: Uuid::new_v4().to_string(),
        aud: jwt_audience(),
        iss: jwt_issuer(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_ref()),
    )
    .map_err(|e| AppError::DatabaseError(format!("Failed to generate token: {}", e)))
}

pub fn verify_id_token(token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[jwt_audience()]);

    let mut issuers = HashSet::new();
    issuers.insert(jwt_issuer());
    validation.iss = Some(issuers);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::InvalidCredentials)
}

// Account record as stored by the identity side of the platform.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct AccountRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    _id: Option<ObjectId>,
    user_id: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>, // None for federated accounts
    display_name: Option<String>,
    photo_url: Option<String>,
    google_id: Option<String>,
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_token: Option<String>,
    created_at: Option<BsonDateTime>,
    updated_at: Option<BsonDateTime>,
    last_login: Option<BsonDateTime>,
}

impl AccountRecord {
    fn identity(&self, id_token: Option<String>) -> Identity {
        Identity {
            id: self.user_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            id_token,
        }
    }
}

pub struct MongoIdentityService {
    accounts: Collection<AccountRecord>,
    current: std::sync::Arc<std::sync::Mutex<Option<Identity>>>,
    events: broadcast::Sender<Option<Identity>>,
}

impl MongoIdentityService {
    pub fn new(platform: &MongoPlatform) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            accounts: platform.collection(ACCOUNTS_COLLECTION),
            current: std::sync::Arc::new(std::sync::Mutex::new(None)),
            events,
        }
    }

    fn emit(&self, identity: Option<Identity>) {
        if let Ok(mut current) = self.current.lock() {
            *current = identity.clone();
        }
        let _ = self.events.send(identity);
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<AccountRecord>> {
        self.accounts
            .find_one(doc! { "email": email })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))
    }

    async fn signed_in(&self, record: &AccountRecord) -> AppResult<Identity> {
        let token = generate_id_token(&record.user_id, &record.email)?;

        self.accounts
            .update_one(
                doc! { "user_id": &record.user_id },
                doc! { "$set": { "last_login": BsonDateTime::now() } },
            )
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;

        let identity = record.identity(Some(token));
        self.emit(Some(identity.clone()));
        Ok(identity)
    }
}

#[async_trait]
impl IdentityService for MongoIdentityService {
    async fn create_account(&self, email: &str, password: &str) -> AppResult<Identity> {
        if password.len() < 6 {
            return Err(AppError::WeakPassword);
        }
        if self.find_by_email(email).await?.is_some() {
            return Err(AppError::EmailInUse);
        }

        let hashed = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::DatabaseError(format!("Failed to hash password: {}", e)))?;

        let record = AccountRecord {
            _id: None,
            user_id: ObjectId::new().to_hex(),
            email: email.to_string(),
            password: Some(hashed),
            display_name: None,
            photo_url: None,
            google_id: None,
            provider: Some("local".to_string()),
            reset_token: None,
            created_at: Some(BsonDateTime::now()),
            updated_at: Some(BsonDateTime::now()),
            last_login: Some(BsonDateTime::now()),
        };

        self.accounts
            .insert_one(&record)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create account: {}", e)))?;

        log::info!("✅ Account created: {}", email);
        // The platform signs a new account in immediately.
        self.signed_in(&record).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        let record = self
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let stored = record
            .password
            .as_ref()
            .ok_or(AppError::InvalidCredentials)?;
        let valid = bcrypt::verify(password, stored)
            .map_err(|e| AppError::DatabaseError(format!("Password verification error: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        self.signed_in(&record).await
    }

    async fn federated_auth_url(&self) -> AppResult<FederatedAuthUrl> {
        google::consent_url()
    }

    async fn sign_in_with_federated_provider(&self, code: Option<&str>) -> AppResult<Identity> {
        let code = code.ok_or(AppError::PopupClosed)?;
        let info = google::exchange_code(code).await?;

        // Find by google_id first, then by email for accounts created with a
        // password before linking Google.
        let existing = self
            .accounts
            .find_one(doc! { "$or": [ { "google_id": &info.id }, { "email": &info.email } ] })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;

        let record = match existing {
            Some(record) => {
                self.accounts
                    .update_one(
                        doc! { "user_id": &record.user_id },
                        doc! { "$set": {
                            "google_id": &info.id,
                            "provider": "google",
                            "display_name": info.name.clone(),
                            "photo_url": info.picture.clone(),
                            "updated_at": BsonDateTime::now(),
                        } },
                    )
                    .await
                    .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;

                AccountRecord {
                    display_name: info.name.clone(),
                    photo_url: info.picture.clone(),
                    google_id: Some(info.id.clone()),
                    provider: Some("google".to_string()),
                    ..record
                }
            }
            None => {
                let record = AccountRecord {
                    _id: None,
                    user_id: ObjectId::new().to_hex(),
                    email: info.email.clone(),
                    password: None,
                    display_name: info.name.clone(),
                    photo_url: info.picture.clone(),
                    google_id: Some(info.id.clone()),
                    provider: Some("google".to_string()),
                    reset_token: None,
                    created_at: Some(BsonDateTime::now()),
                    updated_at: Some(BsonDateTime::now()),
                    last_login: Some(BsonDateTime::now()),
                };
                self.accounts
                    .insert_one(&record)
                    .await
                    .map_err(|e| AppError::DatabaseError(format!("Failed to create account: {}", e)))?;
                log::info!("✅ Federated account created: {}", info.email);
                record
            }
        };

        self.signed_in(&record).await
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.emit(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        let record = self
            .find_by_email(email)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let reset_token = Uuid::new_v4().to_string();
        self.accounts
            .update_one(
                doc! { "user_id": &record.user_id },
                doc! { "$set": { "reset_token": &reset_token, "updated_at": BsonDateTime::now() } },
            )
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;

        // Delivery is the platform's job; the service only queues it.
        log::info!("📧 Password reset email queued for {}", email);
        Ok(())
    }

    async fn update_profile_fields(
        &self,
        identity_id: &str,
        fields: &IdentityProfileFields,
    ) -> AppResult<Identity> {
        let mut set = doc! { "updated_at": BsonDateTime::now() };
        if let Some(name) = &fields.display_name {
            set.insert("display_name", name);
        }
        if let Some(url) = &fields.photo_url {
            set.insert("photo_url", url);
        }

        let result = self
            .accounts
            .update_one(doc! { "user_id": identity_id }, doc! { "$set": set })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;
        if result.matched_count == 0 {
            return Err(AppError::UserNotFound);
        }

        let record = self
            .accounts
            .find_one(doc! { "user_id": identity_id })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?
            .ok_or(AppError::UserNotFound)?;

        // No session event: who is signed in did not change.
        Ok(record.identity(None))
    }

    fn subscribe_to_session_changes(&self, callback: SessionCallback) -> Subscription {
        let mut rx = self.events.subscribe();
        let current = self.current.clone();
        let handle = tokio::spawn(async move {
            // Fires once with the session as it stands, then on every change.
            let initial = current.lock().map(|c| c.clone()).unwrap_or(None);
            callback(initial);

            while let Ok(identity) = rx.recv().await {
                callback(identity);
            }
        });
        Subscription::new(handle)
    }
}

#[derive(Debug, Clone)]
struct DocumentEvent {
    collection: String,
    id: String,
    document: Option<ProfileDocument>,
}

pub struct MongoProfileStore {
    db: Database,
    events: broadcast::Sender<DocumentEvent>,
}

impl MongoProfileStore {
    pub fn new(platform: &MongoPlatform) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            db: platform.database().clone(),
            events,
        }
    }

    fn documents(&self, collection: &str) -> Collection<Document> {
        self.db.collection(collection)
    }

    fn emit(&self, collection: &str, id: &str, document: Option<ProfileDocument>) {
        let _ = self.events.send(DocumentEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        });
    }

    async fn read(
        documents: &Collection<Document>,
        id: &str,
    ) -> AppResult<Option<ProfileDocument>> {
        let found = documents
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;
        match found {
            Some(raw) => {
                let parsed: ProfileDocument = mongodb::bson::from_document(raw)
                    .map_err(|e| AppError::DatabaseError(format!("Malformed document: {}", e)))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProfileStore for MongoProfileStore {
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        document: &ProfileDocument,
    ) -> AppResult<()> {
        let mut raw = mongodb::bson::to_document(document)
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;
        raw.insert("_id", id);

        self.documents(collection)
            .replace_one(doc! { "_id": id }, raw)
            .upsert(true)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to write document: {}", e)))?;

        self.emit(collection, id, Some(document.clone()));
        Ok(())
    }

    async fn update_document_fields(
        &self,
        collection: &str,
        id: &str,
        patch: &ProfileFieldPatch,
    ) -> AppResult<()> {
        let set = mongodb::bson::to_document(patch)
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;

        let documents = self.documents(collection);
        documents
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .upsert(true)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update document: {}", e)))?;

        let snapshot = Self::read(&documents, id).await?;
        self.emit(collection, id, snapshot);
        Ok(())
    }

    async fn read_document_once(
        &self,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<ProfileDocument>> {
        Self::read(&self.documents(collection), id).await
    }

    fn subscribe_to_document(
        &self,
        collection: &str,
        id: &str,
        callback: DocumentCallback,
    ) -> Subscription {
        // Subscribe before the initial read so a concurrent write is never
        // lost between snapshot and stream.
        let mut rx = self.events.subscribe();
        let documents = self.documents(collection);
        let collection = collection.to_string();
        let id = id.to_string();

        let handle = tokio::spawn(async move {
            let initial = Self::read(&documents, &id).await.unwrap_or_else(|e| {
                log::warn!("❌ Initial document read failed for {}: {}", id, e);
                None
            });
            callback(initial);

            while let Ok(event) = rx.recv().await {
                if event.collection == collection && event.id == id {
                    callback(event.document);
                }
            }
        });
        Subscription::new(handle)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobRecord {
    #[serde(rename = "_id")]
    key: String,
    data: Binary,
    content_type: String,
    token: String,
    uploaded_at: BsonDateTime,
}

pub struct MongoBlobStore {
    blobs: Collection<BlobRecord>,
    public_base_url: String,
}

impl MongoBlobStore {
    pub fn new(platform: &MongoPlatform, public_base_url: String) -> Self {
        Self {
            blobs: platform.collection(BLOBS_COLLECTION),
            public_base_url,
        }
    }
}

#[async_trait]
impl BlobStore for MongoBlobStore {
    async fn upload_blob(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> AppResult<BlobReceipt> {
        let token = Uuid::new_v4().to_string();
        let record = BlobRecord {
            key: path.to_string(),
            data: Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.to_vec(),
            },
            content_type: content_type.to_string(),
            token: token.clone(),
            uploaded_at: BsonDateTime::now(),
        };

        let raw = mongodb::bson::to_document(&record)
            .map_err(|e| AppError::UploadFailed(format!("{}", e)))?;
        self.blobs
            .clone_with_type::<Document>()
            .replace_one(doc! { "_id": path }, raw)
            .upsert(true)
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}", e)))?;

        Ok(BlobReceipt {
            key: path.to_string(),
            token,
        })
    }

    async fn get_public_url(&self, receipt: &BlobReceipt) -> AppResult<String> {
        let exists = self
            .blobs
            .find_one(doc! { "_id": &receipt.key })
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}", e)))?;
        if exists.is_none() {
            return Err(AppError::UploadFailed(format!(
                "no blob stored under {}",
                receipt.key
            )));
        }
        Ok(format!(
            "{}/files/{}?token={}",
            self.public_base_url, receipt.key, receipt.token
        ))
    }

    async fn download_blob(&self, key: &str) -> AppResult<Option<(Vec<u8>, String)>> {
        let record = self
            .blobs
            .find_one(doc! { "_id": key })
            .await
            .map_err(|e| AppError::DatabaseError(format!("{}", e)))?;
        Ok(record.map(|r| (r.data.bytes, r.content_type)))
    }
}
