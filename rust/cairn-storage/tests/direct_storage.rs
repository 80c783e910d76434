use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use cairn_identity::{
    Chain, Directory, KeyLink, MemoryDirectory, NodeId, OwnerId, SigningIdentity, UsernameClaim,
};
use cairn_s3_credentials::{Address, Credentials, PayloadHash, PresignedRequest};
use cairn_storage::{
    BlockKind, BlockRouter, BlockStoreProperties, ContentAddressedStorage, ContentHash, Fallback,
    HttpTransport, S3Authorizer, StorageError, TransactionId, hash_block,
};
use parking_lot::Mutex;

const BUCKET_HOST: &str = "blocks.s3.test";
const PUBLIC_URL: &str = "https://blocks.s3.test/";

fn s3_node() -> NodeId {
    NodeId::from(b"s3-node".to_vec())
}

fn other_node() -> NodeId {
    NodeId::from(b"other-node".to_vec())
}

/// Fallback storage service that keeps blocks in a map
#[derive(Default)]
struct ServiceStore {
    blocks: Mutex<HashMap<ContentHash, Vec<u8>>>,
}

impl ServiceStore {
    fn store(&self, blocks: &[Vec<u8>], kind: BlockKind) -> Result<Vec<ContentHash>, StorageError> {
        blocks
            .iter()
            .map(|block| {
                let hash = hash_block(block, kind)?;
                self.blocks.lock().insert(hash, block.clone());
                Ok(hash)
            })
            .collect()
    }
}

#[async_trait]
impl ContentAddressedStorage for ServiceStore {
    async fn id(&self) -> Result<NodeId, StorageError> {
        Ok(s3_node())
    }

    async fn start_transaction(&self, _owner: &OwnerId) -> Result<TransactionId, StorageError> {
        Ok(TransactionId::new("tx"))
    }

    async fn close_transaction(
        &self,
        _owner: &OwnerId,
        _transaction: &TransactionId,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(
        &self,
        _owner: &OwnerId,
        _writer: &OwnerId,
        _signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        _transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.store(blocks, BlockKind::Cbor)
    }

    async fn put_raw(
        &self,
        _owner: &OwnerId,
        _writer: &OwnerId,
        _signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        _transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.store(blocks, BlockKind::Raw)
    }

    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blocks.lock().get(hash).cloned())
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        Ok(self.blocks.lock().get(hash).map(|block| block.len() as u64))
    }

    async fn pin_update(
        &self,
        _owner: &OwnerId,
        _existing: &ContentHash,
        updated: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*updated])
    }

    async fn recursive_pin(
        &self,
        _owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*hash])
    }

    async fn recursive_unpin(
        &self,
        _owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*hash])
    }

    async fn gc(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

struct StoredObject {
    body: Vec<u8>,
    public: bool,
}

/// An object store that only accepts uploads whose signed headers match
/// the body, and only serves anonymous reads of public objects
#[derive(Default)]
struct BucketTransport {
    objects: Mutex<HashMap<String, StoredObject>>,
    gets: Mutex<Vec<String>>,
}

impl BucketTransport {
    fn gets(&self) -> usize {
        self.gets.lock().len()
    }
}

fn rejected(url: &str) -> StorageError {
    StorageError::Backend {
        url: url.to_string(),
        status: 403,
    }
}

#[async_trait]
impl HttpTransport for BucketTransport {
    async fn get(&self, request: &PresignedRequest) -> Result<Vec<u8>, StorageError> {
        self.gets.lock().push(request.url.clone());
        let (path, query) = request
            .url
            .split_once('?')
            .unwrap_or((request.url.as_str(), ""));
        let objects = self.objects.lock();
        let object = objects.get(path).ok_or(StorageError::Backend {
            url: path.to_string(),
            status: 404,
        })?;
        if object.public || query.contains("X-Amz-Signature=") {
            Ok(object.body.clone())
        } else {
            Err(rejected(path))
        }
    }

    async fn put(&self, request: &PresignedRequest, body: Vec<u8>) -> Result<(), StorageError> {
        let authorized = request
            .header("Authorization")
            .is_some_and(|value| value.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        let content_matches = request.header("x-amz-content-sha256")
            == Some(PayloadHash::of(&body).to_string().as_str());
        let length_matches = request.header("Content-Length") == Some(body.len().to_string().as_str());
        if !(authorized && content_matches && length_matches)
            || request.header("Host") != Some(BUCKET_HOST)
        {
            return Err(rejected(&request.url));
        }

        let public = request.header("x-amz-acl") == Some("public-read");
        self.objects
            .lock()
            .insert(request.url.clone(), StoredObject { body, public });
        Ok(())
    }
}

struct Deployment {
    router: BlockRouter<
        Fallback<Arc<S3Authorizer>, Arc<ServiceStore>>,
        Arc<MemoryDirectory>,
        Arc<BucketTransport>,
    >,
    authorizer: Arc<S3Authorizer>,
    service: Arc<ServiceStore>,
    directory: Arc<MemoryDirectory>,
    bucket: Arc<BucketTransport>,
}

async fn deploy(public_reads: bool) -> Result<Deployment> {
    let credentials = Credentials::new(
        Address::new(BUCKET_HOST, "us-east-1")?,
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
    );
    let authorizer = Arc::new(S3Authorizer::new(credentials).with_public_reads(public_reads));
    let service = Arc::new(ServiceStore::default());
    let directory = Arc::new(MemoryDirectory::new());
    let bucket = Arc::new(BucketTransport::default());

    let mut properties = BlockStoreProperties::default().with_direct_writes(true);
    if public_reads {
        properties = properties.with_public_reads(PUBLIC_URL);
    } else {
        properties = properties.with_authed_reads(true);
    }

    let router = BlockRouter::connect(
        properties,
        Fallback::new(authorizer.clone(), service.clone()),
        directory.clone(),
        bucket.clone(),
    )
    .await?;

    Ok(Deployment {
        router,
        authorizer,
        service,
        directory,
        bucket,
    })
}

async fn sign_up(
    deployment: &Deployment,
    username: &str,
    node: NodeId,
) -> Result<(SigningIdentity, OwnerId)> {
    let identity = SigningIdentity::generate()?;
    let claim = UsernameClaim::create_with_providers(
        username,
        &identity,
        UsernameClaim::never_expires(),
        vec![node],
    )?;
    deployment
        .directory
        .update_chain(
            username,
            Chain::single(KeyLink::new(*identity.public_key(), claim)),
        )
        .await?;
    deployment.authorizer.register_writer(*identity.public_key());
    let owner = identity.public_key().hash();
    Ok((identity, owner))
}

fn signatures(
    writer: &SigningIdentity,
    blocks: &[Vec<u8>],
    kind: BlockKind,
) -> Result<Vec<Vec<u8>>> {
    blocks
        .iter()
        .map(|block| Ok(writer.sign(&hash_block(block, kind)?.to_bytes())?))
        .collect()
}

#[tokio::test]
async fn it_stores_and_reads_blocks_through_a_public_bucket() -> Result<()> {
    let deployment = deploy(true).await?;
    let (alice, owner) = sign_up(&deployment, "alice", s3_node()).await?;

    let blocks = vec![b"chapter one".to_vec(), b"chapter two".to_vec()];
    let transaction = deployment.router.start_transaction(&owner).await?;
    let hashes = deployment
        .router
        .put_raw(
            &owner,
            &owner,
            &signatures(&alice, &blocks, BlockKind::Raw)?,
            &blocks,
            &transaction,
        )
        .await?;
    deployment
        .router
        .close_transaction(&owner, &transaction)
        .await?;

    assert_eq!(hashes[0], hash_block(&blocks[0], BlockKind::Raw)?);
    assert_eq!(hashes[1], hash_block(&blocks[1], BlockKind::Raw)?);
    assert!(deployment.service.blocks.lock().is_empty());

    for (hash, block) in hashes.iter().zip(&blocks) {
        assert_eq!(deployment.router.get_raw(hash).await?, Some(block.clone()));
    }
    assert_eq!(deployment.bucket.gets(), 2);
    Ok(())
}

#[tokio::test]
async fn it_reads_private_objects_with_presigned_urls() -> Result<()> {
    let deployment = deploy(false).await?;
    let (bob, owner) = sign_up(&deployment, "bob", s3_node()).await?;

    let blocks = vec![serde_ipld_dagcbor::to_vec(&"private")?];
    let hashes = deployment
        .router
        .put(
            &owner,
            &owner,
            &signatures(&bob, &blocks, BlockKind::Cbor)?,
            &blocks,
            &TransactionId::new("tx"),
        )
        .await?;

    assert_eq!(deployment.router.get_raw(&hashes[0]).await?, Some(blocks[0].clone()));
    assert_eq!(deployment.bucket.gets(), 1);
    Ok(())
}

#[tokio::test]
async fn it_falls_back_to_signed_reads_when_objects_are_not_public() -> Result<()> {
    let deployment = deploy(false).await?;
    let (carol, owner) = sign_up(&deployment, "carol", s3_node()).await?;

    let blocks = vec![b"unlisted".to_vec()];
    let hashes = deployment
        .router
        .put_raw(
            &owner,
            &owner,
            &signatures(&carol, &blocks, BlockKind::Raw)?,
            &blocks,
            &TransactionId::new("tx"),
        )
        .await?;

    // A router that believes the bucket is public tries an anonymous read
    // first, which the bucket refuses
    let reader = BlockRouter::new(
        BlockStoreProperties::default().with_public_reads(PUBLIC_URL),
        Fallback::new(deployment.authorizer.clone(), deployment.service.clone()),
        deployment.directory.clone(),
        deployment.bucket.clone(),
        other_node(),
    )?;

    assert_eq!(reader.get_raw(&hashes[0]).await?, Some(blocks[0].clone()));
    assert_eq!(deployment.bucket.gets(), 2);
    Ok(())
}

#[tokio::test]
async fn it_leaves_other_nodes_owners_to_the_service() -> Result<()> {
    let deployment = deploy(true).await?;
    let (dave, owner) = sign_up(&deployment, "dave", other_node()).await?;

    let blocks = vec![b"elsewhere".to_vec()];
    let hashes = deployment
        .router
        .put_raw(
            &owner,
            &owner,
            &signatures(&dave, &blocks, BlockKind::Raw)?,
            &blocks,
            &TransactionId::new("tx"),
        )
        .await?;

    assert!(deployment.service.blocks.lock().contains_key(&hashes[0]));
    assert!(deployment.bucket.objects.lock().is_empty());
    assert_eq!(deployment.router.get_raw(&hashes[0]).await?, Some(blocks[0].clone()));
    Ok(())
}

#[tokio::test]
async fn it_refuses_direct_writes_signed_by_a_stranger() -> Result<()> {
    let deployment = deploy(true).await?;
    let (_, owner) = sign_up(&deployment, "erin", s3_node()).await?;
    let stranger = SigningIdentity::generate()?;

    let blocks = vec![b"forged".to_vec()];
    let result = deployment
        .router
        .put_raw(
            &owner,
            &owner,
            &signatures(&stranger, &blocks, BlockKind::Raw)?,
            &blocks,
            &TransactionId::new("tx"),
        )
        .await;

    assert!(matches!(result, Err(StorageError::Identity(_))));
    assert!(deployment.bucket.objects.lock().is_empty());
    Ok(())
}
