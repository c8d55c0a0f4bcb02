//! Atomic mutation scripts.
//!
//! Each script runs server-side on the shared store, so no two writers can
//! interleave its steps: it reads the store clock, decodes the list's items
//! map, applies the mutation, writes the map back with the new revision,
//! and publishes the fan-out message. A message is emitted iff the cache
//! mutation committed. The revision is returned as a decimal string.
//!
//! `redis::Script` registers each script by SHA at first use and invokes
//! it by hash afterwards.

use redis::Script;

/// KEYS[1] = list state key, ARGV[1] = item id, ARGV[2] = item JSON,
/// ARGV[3] = pub/sub channel. Returns the new revision string.
const ADD_ITEM_LUA: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]
local item_json = ARGV[2]
local channel = ARGV[3]

local time = redis.call('TIME')
local new_rev = string.format('%d.%06d', tonumber(time[1]), tonumber(time[2]))

local items_json = redis.call('HGET', list_key, 'items')
local items = {}
if items_json then
    items = cjson.decode(items_json)
end

items[item_id] = cjson.decode(item_json)

redis.call('HSET', list_key,
    'rev', new_rev,
    'items', cjson.encode(items),
    'updated_at', time[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
redis.call('PUBLISH', channel, cjson.encode({
    type = 'item_added',
    list_id = list_id,
    item = cjson.decode(item_json),
    rev = new_rev
}))

return new_rev
"#;

/// Same arguments as `add_item`; fails if the list or item is absent.
const UPDATE_ITEM_LUA: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]
local item_json = ARGV[2]
local channel = ARGV[3]

local time = redis.call('TIME')
local new_rev = string.format('%d.%06d', tonumber(time[1]), tonumber(time[2]))

local items_json = redis.call('HGET', list_key, 'items')
if not items_json then
    return redis.error_reply('list not found')
end

local items = cjson.decode(items_json)
if items[item_id] == nil or items[item_id] == cjson.null then
    return redis.error_reply('item not found')
end

items[item_id] = cjson.decode(item_json)

redis.call('HSET', list_key,
    'rev', new_rev,
    'items', cjson.encode(items),
    'updated_at', time[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
redis.call('PUBLISH', channel, cjson.encode({
    type = 'item_updated',
    list_id = list_id,
    item = cjson.decode(item_json),
    rev = new_rev
}))

return new_rev
"#;

/// KEYS[1] = list state key, ARGV[1] = item id, ARGV[2] = pub/sub channel.
/// Replaces the item with a tombstone (kept so stale replicas converge);
/// the durable store soft-deletes separately.
const DELETE_ITEM_LUA: &str = r#"
local list_key = KEYS[1]
local item_id = ARGV[1]
local channel = ARGV[2]

local time = redis.call('TIME')
local new_rev = string.format('%d.%06d', tonumber(time[1]), tonumber(time[2]))

local items_json = redis.call('HGET', list_key, 'items')
if not items_json then
    return redis.error_reply('list not found')
end

local items = cjson.decode(items_json)
if items[item_id] == nil or items[item_id] == cjson.null then
    return redis.error_reply('item not found')
end

items[item_id] = cjson.null

redis.call('HSET', list_key,
    'rev', new_rev,
    'items', cjson.encode(items),
    'updated_at', time[1]
)

local list_id = string.match(list_key, 'todo:state:(.+)')
redis.call('PUBLISH', channel, cjson.encode({
    type = 'item_deleted',
    list_id = list_id,
    item_id = item_id,
    rev = new_rev
}))

return new_rev
"#;

/// The three mutation scripts, prepared once at startup.
pub struct MutationScripts {
    pub add_item: Script,
    pub update_item: Script,
    pub delete_item: Script,
}

impl MutationScripts {
    pub fn new() -> Self {
        Self {
            add_item: Script::new(ADD_ITEM_LUA),
            update_item: Script::new(UPDATE_ITEM_LUA),
            delete_item: Script::new(DELETE_ITEM_LUA),
        }
    }
}

impl Default for MutationScripts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_have_distinct_hashes() {
        let scripts = MutationScripts::new();
        assert_ne!(scripts.add_item.get_hash(), scripts.update_item.get_hash());
        assert_ne!(
            scripts.update_item.get_hash(),
            scripts.delete_item.get_hash()
        );
    }

    #[test]
    fn mutating_scripts_guard_missing_state() {
        // The add script tolerates a missing list key (first write seeds the
        // map); update and delete must refuse instead.
        assert!(!ADD_ITEM_LUA.contains("error_reply"));
        assert!(UPDATE_ITEM_LUA.contains("list not found"));
        assert!(UPDATE_ITEM_LUA.contains("item not found"));
        assert!(DELETE_ITEM_LUA.contains("cjson.null"));
    }
}
